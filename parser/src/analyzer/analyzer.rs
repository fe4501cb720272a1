use crate::decoder::{DecoderStats, Record};

pub trait Analyzer {
    fn process(&mut self, record: &Record);
    /// Line counters of the decoder that fed `process`, reported once before
    /// [`Analyzer::finish`].
    fn decoder_finished(&mut self, _stats: DecoderStats) {}
    fn finish(&mut self);
}

use std::io::Write;

use tracing::warn;

use crate::analyzer::Analyzer;
use crate::decoder::Record;

/// Writes every record as one JSON document per line.
pub struct RecordDump<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> RecordDump<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_record(&mut self, record: &Record) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        writeln!(self.out)
    }
}

impl<W: Write> Analyzer for RecordDump<W> {
    fn finish(&mut self) {
        if let Err(err) = self.out.flush() {
            warn!("failed to flush record dump: {err}");
        }
    }

    fn process(&mut self, record: &Record) {
        match self.write_record(record) {
            Ok(()) => self.written += 1,
            Err(err) => warn!("failed to dump record: {err}"),
        }
    }
}

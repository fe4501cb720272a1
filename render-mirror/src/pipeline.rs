use std::thread::JoinHandle;

use serde::Serialize;
use tracing::{Level, debug, span};

use acmi_telemetry::FeedError;
use acmi_telemetry::analyzer::Analyzer;
use acmi_telemetry::analyzer::world::WorldState;
use acmi_telemetry::entity::Entity;
use acmi_telemetry::feed::LineQueue;
use acmi_telemetry::types::WorldPos;

use crate::error::MirrorError;
use crate::mirror::{FacetReport, Frame, MirrorOptions, RenderMirror};

/// What one [`Pipeline::tick`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickStats {
    pub lines: usize,
    pub records: usize,
    pub entities: usize,
    pub icons: usize,
    pub velocity_vectors: usize,
    pub lock_lines: usize,
}

/// Line queue, world state and render mirror driven by a single consumer.
pub struct Pipeline {
    queue: LineQueue,
    world: WorldState,
    mirror: RenderMirror,
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(MirrorOptions::default())
    }
}

impl Pipeline {
    pub fn new(options: MirrorOptions) -> Self {
        Self::with_world(WorldState::new(), options)
    }

    pub fn with_world(world: WorldState, options: MirrorOptions) -> Self {
        Pipeline {
            queue: LineQueue::new(),
            world,
            mirror: RenderMirror::new(options),
            analyzers: Vec::new(),
        }
    }

    /// Run `analyzer` over every record before it reaches the world.
    pub fn add_analyzer(&mut self, analyzer: Box<dyn Analyzer>) {
        self.analyzers.push(analyzer);
    }

    /// Producers push lines here from any thread.
    pub fn queue(&self) -> &LineQueue {
        &self.queue
    }

    pub fn push_line(&self, line: impl Into<String>) {
        self.queue.push(line);
    }

    /// Decode and apply everything queued so far.
    pub fn tick(&mut self) -> TickStats {
        let span = span!(Level::TRACE, "tick");
        let _enter = span.enter();

        let mut stats = TickStats::default();
        let mut records = Vec::new();
        for line in self.queue.drain() {
            stats.lines += 1;
            if let Some(record) = self.world.decoder_mut().decode_line(&line) {
                for analyzer in self.analyzers.iter_mut() {
                    analyzer.process(&record);
                }
                records.push(record);
            }
        }
        stats.records = self.world.drain_and_apply(records, &mut self.mirror);

        stats.entities = self.world.len();
        stats.icons = self.mirror.icon_count();
        stats.velocity_vectors = self.mirror.velocity_vectors().len();
        stats.lock_lines = self.mirror.lock_lines().len();
        if stats.lines > 0 {
            debug!(
                "tick: {} lines, {} records, {} entities",
                stats.lines, stats.records, stats.entities
            );
        }
        stats
    }

    /// Flush analyzers once the source is exhausted.
    pub fn finish(&mut self) {
        let lines = self.world.decoder().stats();
        for analyzer in self.analyzers.iter_mut() {
            analyzer.decoder_finished(lines);
            analyzer.finish();
        }
        self.world.finish();
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn mirror(&self) -> &RenderMirror {
        &self.mirror
    }

    pub fn frame(&self) -> Frame<'_> {
        self.mirror.frame()
    }

    pub fn memory_report(&self) -> Vec<FacetReport> {
        self.mirror.memory_report()
    }

    /// Entity under `point`, hit-tested against the packed icon positions.
    pub fn nearest(&self, point: WorldPos, max_distance: f64) -> Option<&Entity> {
        self.world.nearest_entity(&self.mirror, point, max_distance)
    }

    pub fn bullseye_relative(&self, point: WorldPos) -> (f64, f64) {
        self.world.bullseye_relative(point)
    }

    pub fn modify_entity(&mut self, id: &str, modify: impl FnOnce(&mut Entity)) -> bool {
        self.world.modify_entity(id, &mut self.mirror, modify)
    }

    pub fn set_options(&mut self, options: MirrorOptions) {
        self.mirror.set_options(options, &self.world);
    }

    /// Forget every entity, e.g. after the feed dropped. Queued lines are
    /// discarded too.
    pub fn clear(&mut self) {
        let dropped = self.queue.drain().count();
        self.world.clear(&mut self.mirror);
        self.mirror.clear();
        debug!("pipeline cleared, {dropped} queued lines dropped");
    }
}

/// Wait for a producer thread and return how many lines it queued.
pub fn join_producer(handle: JoinHandle<Result<usize, FeedError>>) -> Result<usize, MirrorError> {
    match handle.join() {
        Ok(result) => Ok(result?),
        Err(_) => Err(MirrorError::ProducerPanicked),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acmi_telemetry::analyzer::survey::{Survey, SurveyStats};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::thread;

    #[test]
    fn producer_results_are_joined() {
        let ok = thread::spawn(|| Ok(7));
        assert_eq!(join_producer(ok).unwrap(), 7);

        let failed = thread::spawn(|| Err(FeedError::HandshakeClosed));
        assert!(matches!(
            join_producer(failed),
            Err(MirrorError::Feed(FeedError::HandshakeClosed))
        ));

        let panicked = thread::spawn(|| -> Result<usize, FeedError> { panic!("reader died") });
        assert!(matches!(join_producer(panicked), Err(MirrorError::ProducerPanicked)));
    }

    #[test]
    fn tick_drains_queue() {
        let mut pipeline = Pipeline::default();
        for line in [
            "FileType=text/acmi/tacview",
            "#0",
            "a1,T=1|2|3|0|0,Type=Air+FixedWing,CAS=120",
            "b2,T=1|2|3|500|0,Type=Ground+Vehicle",
        ] {
            pipeline.push_line(line);
        }

        let stats = pipeline.tick();
        assert_eq!(stats.lines, 4);
        assert_eq!(stats.records, 3);
        assert_eq!(stats.entities, 2);
        assert_eq!(stats.icons, 2);
        assert_eq!(stats.velocity_vectors, 1);
        assert!(pipeline.queue().is_empty());

        assert_eq!(pipeline.tick(), TickStats { lines: 0, records: 0, ..stats });
    }

    #[test]
    fn analyzers_see_every_record() {
        let stats = Rc::new(RefCell::new(SurveyStats::new()));
        let mut pipeline = Pipeline::default();
        pipeline.add_analyzer(Box::new(Survey::new(stats.clone())));
        pipeline.push_line("#1");
        pipeline.push_line("a1,T=1|2|3|0|0,Type=Air+FixedWing");
        pipeline.push_line("-a1");
        pipeline.push_line("#1e15");
        pipeline.push_line("// end");
        pipeline.tick();
        pipeline.finish();

        let stats = stats.borrow();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.removals, 1);
        assert_eq!(stats.lines.lines, 5);
        assert_eq!(stats.lines.malformed, 1);
        assert_eq!(stats.lines.ignored, 1);
        assert!(pipeline.world().is_empty());
    }

    #[test]
    fn clear_resets_world_and_mirror() {
        let mut pipeline = Pipeline::default();
        pipeline.push_line("a1,T=1|2|3|0|0,Type=Air+FixedWing");
        pipeline.tick();
        pipeline.push_line("b2,T=1|2|3|0|0,Type=Air+FixedWing");
        pipeline.clear();

        assert!(pipeline.world().is_empty());
        assert_eq!(pipeline.mirror().icon_count(), 0);
        assert_eq!(pipeline.tick().lines, 0);
        pipeline.mirror().assert_invariants();
    }

    #[test]
    fn rename_and_hide_through_pipeline() {
        let mut pipeline = Pipeline::default();
        pipeline.push_line("a1,T=1|2|3|10|10,Type=Air+FixedWing,Pilot=Maverick");
        pipeline.tick();

        assert!(pipeline.modify_entity("a1", |e| e.change_name("Lead")));
        let hit = pipeline.nearest(WorldPos::new(12.0, 10.0), 5.0);
        assert_eq!(hit.map(Entity::display_name), Some("Lead".to_string()));

        assert!(pipeline.modify_entity("a1", Entity::hide));
        assert!(pipeline.nearest(WorldPos::new(12.0, 10.0), 5.0).is_none());
        assert!(!pipeline.modify_entity("zz", Entity::hide));
    }
}

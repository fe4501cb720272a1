use std::cell::{RefCell, RefMut};
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;

use serde::Serialize;

use crate::analyzer::Analyzer;
use crate::classification::ObjectClass;
use crate::decoder::{DecoderStats, Record, RecordPayloadKind};
use crate::types::{ObjectId, Timestamp};

#[derive(Debug, Default, Serialize)]
pub struct SurveyStats {
    pub total_records: usize,
    pub time_advances: usize,
    pub removals: usize,
    pub global_updates: usize,
    pub entity_updates: usize,
    pub first_timestamp: Option<Timestamp>,
    pub last_timestamp: Option<Timestamp>,
    /// Every id that appeared in an update or removal
    pub object_ids: HashSet<ObjectId>,
    /// `Type` values that match no tracked class
    pub unclassified_types: BTreeSet<String>,
    /// Line counts, including malformed and ignored lines that never became
    /// records
    pub lines: DecoderStats,
}

impl SurveyStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Tallies a record stream without building any world state.
pub struct Survey {
    stats: Rc<RefCell<SurveyStats>>,
}

impl Survey {
    pub fn new(stats: Rc<RefCell<SurveyStats>>) -> Self {
        Self { stats }
    }
}

impl Analyzer for Survey {
    fn decoder_finished(&mut self, stats: DecoderStats) {
        self.stats.borrow_mut().lines = stats;
    }

    fn finish(&mut self) {}

    fn process(&mut self, record: &Record) {
        let mut stats: RefMut<_> = self.stats.borrow_mut();
        match record.payload.kind() {
            RecordPayloadKind::TimeAdvance => stats.time_advances += 1,
            RecordPayloadKind::Remove => stats.removals += 1,
            RecordPayloadKind::GlobalUpdate => stats.global_updates += 1,
            RecordPayloadKind::EntityUpdate => stats.entity_updates += 1,
        }

        if let Some(id) = record.id() {
            if !stats.object_ids.contains(id) {
                stats.object_ids.insert(id.clone());
            }
        }
        if let Some(kind) = record.text("Type") {
            if ObjectClass::from_type_str(kind).is_none() && !stats.unclassified_types.contains(kind) {
                stats.unclassified_types.insert(kind.to_string());
            }
        }

        stats.first_timestamp.get_or_insert(record.timestamp);
        stats.last_timestamp = Some(record.timestamp);
        stats.total_records += 1;
    }
}

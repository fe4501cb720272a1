use std::collections::{HashMap, HashSet};

use tracing::{Level, debug, span, trace};

use crate::analyzer::Analyzer;
use crate::classification::ObjectClass;
use crate::decoder::{Decoder, Properties, PropertyValue, Record, RecordPayload};
use crate::entity::Entity;
use crate::types::{ObjectId, Timestamp, WorldPos};

use super::listener::{SpatialIndex, WorldStateView};
use super::observer::WorldObserver;

/// Id the reference point is looked up under before falling back to any
/// object classified as a bullseye.
pub const DEFAULT_BULLSEYE_ID: &str = "7fffffffffffffff";

/// Authoritative table of live telemetry objects.
pub struct WorldState {
    decoder: Decoder,
    clock: Timestamp,
    entities: HashMap<ObjectId, Entity>,
    by_class: HashMap<ObjectClass, HashSet<ObjectId>>,
    globals: Properties,
    bullseye_id: ObjectId,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldState {
    pub fn new() -> Self {
        WorldState {
            decoder: Decoder::new(),
            clock: Timestamp::default(),
            entities: HashMap::new(),
            by_class: HashMap::new(),
            globals: Properties::new(),
            bullseye_id: ObjectId::from(DEFAULT_BULLSEYE_ID),
        }
    }

    pub fn with_bullseye_id(mut self, id: impl Into<ObjectId>) -> Self {
        self.bullseye_id = id.into();
        self
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// For callers that need each record before it is applied.
    pub fn decoder_mut(&mut self) -> &mut Decoder {
        &mut self.decoder
    }

    /// Decode raw lines with the owned decoder and apply the resulting
    /// records. Returns the number of records applied.
    pub fn ingest_lines<I, S>(&mut self, lines: I, observer: &mut impl WorldObserver) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut applied = 0;
        for line in lines {
            if let Some(record) = self.decoder.decode_line(line.as_ref()) {
                self.apply(&record, observer);
                applied += 1;
            }
        }
        applied
    }

    /// Apply already decoded records in arrival order.
    pub fn drain_and_apply<I>(&mut self, records: I, observer: &mut impl WorldObserver) -> usize
    where
        I: IntoIterator<Item = Record>,
    {
        let mut applied = 0;
        for record in records {
            self.apply(&record, observer);
            applied += 1;
        }
        applied
    }

    pub fn apply(&mut self, record: &Record, observer: &mut impl WorldObserver) {
        let span = span!(Level::TRACE, "record processing");
        let _enter = span.enter();

        self.clock = record.timestamp;
        match &record.payload {
            RecordPayload::TimeAdvance { offset } => trace!("frame at {offset}s"),
            RecordPayload::Remove { id } => self.handle_remove(id, observer),
            RecordPayload::GlobalUpdate { properties } => self.handle_global_update(properties),
            RecordPayload::EntityUpdate { id, properties } => {
                self.handle_entity_update(id, record.timestamp, properties, observer)
            }
        }
    }

    fn handle_remove(&mut self, id: &ObjectId, observer: &mut impl WorldObserver) {
        let Some(entity) = self.entities.remove(id) else {
            debug!("removal of unknown object {id}");
            return;
        };
        if let Some(ids) = self.by_class.get_mut(&entity.class()) {
            ids.remove(id);
        }
        trace!("removed {} {id}", entity.class());

        observer.entity_removed(id, &*self);
        self.refresh_locks(observer);
    }

    fn handle_global_update(&mut self, properties: &Properties) {
        for (key, value) in properties {
            self.globals.insert(key.clone(), value.clone());
        }
    }

    fn handle_entity_update(
        &mut self,
        id: &ObjectId,
        timestamp: Timestamp,
        properties: &Properties,
        observer: &mut impl WorldObserver,
    ) {
        if let Some(entity) = self.entities.get_mut(id) {
            // Class is fixed at creation; a later Type never moves the entity.
            debug_assert!(
                self.by_class
                    .get(&entity.class())
                    .is_some_and(|ids| ids.contains(id)),
                "{id} is missing from its {} bucket",
                entity.class()
            );
            entity.apply_delta(timestamp, properties);
            self.resolve_locks_of(id);
            if let Some(entity) = self.entities.get(id) {
                observer.entity_upserted(entity, &*self);
            }
            return;
        }

        let Some(entity) = Entity::from_update(id.clone(), timestamp, properties) else {
            trace!("discarding unclassified object {id}");
            return;
        };
        debug!("new {} {id} ({})", entity.class(), entity.display_name());

        self.by_class
            .entry(entity.class())
            .or_default()
            .insert(id.clone());
        self.entities.insert(id.clone(), entity);

        self.resolve_locks_of(id);
        if let Some(entity) = self.entities.get(id) {
            observer.entity_upserted(entity, &*self);
        }
        self.refresh_locks(observer);
    }

    /// Re-resolve the lock slots of a single entity. Returns whether its
    /// resolved targets changed.
    fn resolve_locks_of(&mut self, id: &ObjectId) -> bool {
        let Some(targets) = self
            .entities
            .get(id)
            .map(|entity| entity.resolve_locked_targets(&self.entities))
        else {
            return false;
        };
        match self.entities.get_mut(id) {
            Some(entity) if entity.locked_targets() != targets.as_slice() => {
                entity.set_locked_targets(targets);
                true
            }
            _ => false,
        }
    }

    /// Re-resolve every entity's lock slots after the table changed shape.
    fn refresh_locks(&mut self, observer: &mut impl WorldObserver) {
        let changed: Vec<(ObjectId, Vec<ObjectId>)> = self
            .entities
            .values()
            .filter(|entity| entity.lock_slots().next().is_some() || !entity.locked_targets().is_empty())
            .filter_map(|entity| {
                let targets = entity.resolve_locked_targets(&self.entities);
                (targets.as_slice() != entity.locked_targets())
                    .then(|| (entity.id().clone(), targets))
            })
            .collect();

        for (id, targets) in changed {
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.set_locked_targets(targets);
            }
            if let Some(entity) = self.entities.get(&id) {
                observer.locks_changed(entity, &*self);
            }
        }
    }

    /// Run a UI-side mutation (rename, recolor, hide) and notify `observer`.
    /// Returns `false` if `id` is not live.
    pub fn modify_entity(
        &mut self,
        id: &str,
        observer: &mut impl WorldObserver,
        modify: impl FnOnce(&mut Entity),
    ) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        modify(entity);
        if let Some(entity) = self.entities.get(id) {
            observer.entity_upserted(entity, &*self);
        }
        true
    }

    /// Drop every entity and global property and rewind the time cursor.
    pub fn clear(&mut self, observer: &mut impl WorldObserver) {
        let ids: Vec<ObjectId> = self.entities.keys().cloned().collect();
        self.entities.clear();
        self.by_class.clear();
        self.globals.clear();
        self.decoder.reset();
        self.clock = Timestamp::default();
        for id in &ids {
            observer.entity_removed(id, &*self);
        }
        debug!("cleared {} entities", ids.len());
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities_of(&self, class: ObjectClass) -> impl Iterator<Item = &Entity> {
        self.by_class
            .get(&class)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entities.get(id))
    }

    pub fn global(&self, key: &str) -> Option<&str> {
        self.globals
            .get(key)
            .and_then(PropertyValue::text_ref)
            .map(String::as_str)
    }

    pub fn locked_targets(&self, id: &str) -> Option<&[ObjectId]> {
        self.entities.get(id).map(Entity::locked_targets)
    }

    /// Bearing (degrees true) and range (nautical miles) of `point` from the
    /// bullseye.
    pub fn bullseye_relative(&self, point: WorldPos) -> (f64, f64) {
        let bullseye = WorldStateView::bullseye_position(self);
        (bullseye.bearing_to(point), bullseye.range_nm(point))
    }

    /// Entity closest to `point`, answered by `index`.
    pub fn nearest_entity(
        &self,
        index: &impl SpatialIndex,
        point: WorldPos,
        max_distance: f64,
    ) -> Option<&Entity> {
        index
            .nearest(point, max_distance)
            .and_then(|id| self.entities.get(&id))
    }

    /// Whether the class index and the entity table agree.
    pub fn is_consistent(&self) -> bool {
        let indexed: usize = self.by_class.values().map(HashSet::len).sum();
        indexed == self.entities.len()
            && self.by_class.iter().all(|(class, ids)| {
                ids.iter()
                    .all(|id| self.entities.get(id).is_some_and(|e| e.class() == *class))
            })
    }
}

impl WorldStateView for WorldState {
    fn clock(&self) -> Timestamp {
        self.clock
    }

    fn entities(&self) -> &HashMap<ObjectId, Entity> {
        &self.entities
    }

    fn ids_of(&self, class: ObjectClass) -> Option<&HashSet<ObjectId>> {
        self.by_class.get(&class)
    }

    fn globals(&self) -> &Properties {
        &self.globals
    }

    fn bullseye_position(&self) -> WorldPos {
        if let Some(bullseye) = self.entities.get(&self.bullseye_id) {
            return bullseye.position();
        }
        self.entities_of(ObjectClass::Bullseye)
            .next()
            .map(Entity::position)
            .unwrap_or(WorldPos::ORIGIN)
    }
}

/// Linear scan over the entity table. Render mirrors provide a packed
/// alternative.
impl SpatialIndex for WorldState {
    fn nearest(&self, point: WorldPos, max_distance: f64) -> Option<ObjectId> {
        let limit = max_distance * max_distance;
        self.entities
            .values()
            .filter(|entity| entity.is_visible())
            .map(|entity| (entity, entity.position().distance_squared(point)))
            .filter(|(_, distance)| *distance <= limit)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(entity, _)| entity.id().clone())
    }
}

impl Analyzer for WorldState {
    fn process(&mut self, record: &Record) {
        self.apply(record, &mut ());
    }

    fn finish(&mut self) {
        debug!(
            "world holds {} entities at {}",
            self.entities.len(),
            self.clock
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        upserted: Vec<ObjectId>,
        removed: Vec<ObjectId>,
        locks: Vec<(ObjectId, Vec<ObjectId>)>,
    }

    impl WorldObserver for Recorder {
        fn entity_upserted(&mut self, entity: &Entity, _world: &dyn WorldStateView) {
            self.upserted.push(entity.id().clone());
        }

        fn entity_removed(&mut self, id: &ObjectId, world: &dyn WorldStateView) {
            assert!(world.entity(id.as_str()).is_none());
            self.removed.push(id.clone());
        }

        fn locks_changed(&mut self, entity: &Entity, _world: &dyn WorldStateView) {
            self.locks
                .push((entity.id().clone(), entity.locked_targets().to_vec()));
        }
    }

    fn world_with(lines: &[&str]) -> WorldState {
        let mut world = WorldState::new();
        world.ingest_lines(lines.iter().copied(), &mut ());
        world
    }

    #[test]
    fn create_update_remove() {
        let mut recorder = Recorder::default();
        let mut world = WorldState::new();
        world.ingest_lines(
            [
                "FileType=text/acmi/tacview",
                "FileVersion=2.2",
                "#0.00",
                "9341,T=6.85|7.27|4572.13|-4.2|3.5|-161.8|701491.99|679328.81|-155.7,Health=1.00,Type=Air+FixedWing",
                "#1.00",
                "9341,T=|||||||679400.00|",
            ],
            &mut recorder,
        );

        let entity = world.entity("9341").unwrap();
        assert_eq!(entity.class(), ObjectClass::FixedWing);
        assert_eq!(entity.orientation.u, 701491.99);
        assert_eq!(entity.orientation.v, 679400.0);
        assert_eq!(recorder.upserted.len(), 2);
        assert!(world.is_consistent());

        world.ingest_lines(["#2", "-9341"], &mut recorder);
        assert!(world.is_empty());
        assert_eq!(recorder.removed, vec![ObjectId::from("9341")]);
        assert!(world.is_consistent());
        assert_eq!(world.entities_of(ObjectClass::FixedWing).count(), 0);
    }

    #[test]
    fn unclassified_objects_are_not_stored() {
        let mut recorder = Recorder::default();
        let mut world = WorldState::new();
        world.ingest_lines(
            ["500,T=1|2|3|4|5,Type=Misc+Shrapnel", "501,Name=NoType"],
            &mut recorder,
        );
        assert!(world.is_empty());
        assert!(recorder.upserted.is_empty());
    }

    #[test]
    fn removing_unknown_id_is_noop() {
        let mut recorder = Recorder::default();
        let mut world = world_with(&["a1,T=1|2|3|4|5,Type=Ground+Vehicle"]);
        world.ingest_lines(["-zz"], &mut recorder);
        assert_eq!(world.len(), 1);
        assert!(recorder.removed.is_empty());
        assert!(world.is_consistent());
    }

    #[test]
    fn classification_is_fixed_at_creation() {
        let world = world_with(&[
            "a1,T=1|2|3|4|5,Type=Air+FixedWing",
            "a1,Type=Weapon+Missile",
        ]);
        let entity = world.entity("a1").unwrap();
        assert_eq!(entity.class(), ObjectClass::FixedWing);
        assert_eq!(entity.labels.kind, "Weapon+Missile");
        assert_eq!(world.entities_of(ObjectClass::Missile).count(), 0);
        assert_eq!(world.entities_of(ObjectClass::FixedWing).count(), 1);
        assert!(world.is_consistent());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "missing from its")]
    fn class_bucket_mismatch_is_caught_in_debug_builds() {
        let mut world = world_with(&["a1,T=1|2|3|4|5,Type=Air+FixedWing"]);
        world.by_class.clear();
        world.ingest_lines(["a1,Name=Viper"], &mut ());
    }

    #[test]
    fn drained_records_apply_in_arrival_order() {
        let mut decoder = Decoder::new();
        let records: Vec<Record> = [
            "0,Title=Batch",
            "#1",
            "a1,T=1|2|3|10|10,Type=Air+FixedWing,LockedTarget=b2",
            "b2,T=1|2|3|20|20,Type=Sea+Watercraft",
            "-zz",
            "#2",
            "a1,T=|||||||15|",
            "-b2",
            "c3,T=1|2|3|30|30,Type=Ground+Vehicle",
        ]
        .into_iter()
        .filter_map(|line| decoder.decode_line(line))
        .collect();
        assert_eq!(records.len(), 9);
        let last = records[records.len() - 1].timestamp;

        let mut recorder = Recorder::default();
        let mut world = WorldState::new();
        assert_eq!(world.drain_and_apply(records, &mut recorder), 9);

        assert_eq!(world.global("Title"), Some("Batch"));
        assert_eq!(
            recorder.upserted,
            ["a1", "b2", "a1", "c3"].map(ObjectId::from).to_vec()
        );
        assert_eq!(recorder.removed, vec![ObjectId::from("b2")]);
        assert_eq!(
            recorder.locks,
            vec![
                (ObjectId::from("a1"), vec![ObjectId::from("b2")]),
                (ObjectId::from("a1"), vec![]),
            ]
        );
        assert_eq!(world.entity("a1").unwrap().orientation.v, 15.0);
        assert!(world.entity("b2").is_none());
        assert_eq!(world.len(), 2);
        assert_eq!(WorldStateView::clock(&world), last);
        assert!(world.is_consistent());

        assert_eq!(world.drain_and_apply(Vec::new(), &mut recorder), 0);
    }

    #[test]
    fn globals_last_write_wins() {
        let world = world_with(&[
            "0,Title=First,Author=me",
            "0,Title=Second",
            "0,ReferenceTime=2020-01-01T00:00:00Z",
        ]);
        assert_eq!(world.global("Title"), Some("Second"));
        assert_eq!(world.global("Author"), Some("me"));
        assert_eq!(world.global("Missing"), None);
        assert!(world.is_empty());
    }

    #[test]
    fn locks_resolve_when_targets_appear_and_vanish() {
        let mut recorder = Recorder::default();
        let mut world = WorldState::new();
        world.ingest_lines(
            ["a1,T=1|2|3|4|5,Type=Air+FixedWing,LockedTarget=b2"],
            &mut recorder,
        );
        assert_eq!(world.locked_targets("a1"), Some(&[][..]));

        world.ingest_lines(["b2,T=9|9|9|40|50,Type=Air+FixedWing"], &mut recorder);
        assert_eq!(
            world.locked_targets("a1"),
            Some(&[ObjectId::from("b2")][..])
        );
        assert_eq!(
            recorder.locks.last(),
            Some(&(ObjectId::from("a1"), vec![ObjectId::from("b2")]))
        );

        world.ingest_lines(["-b2"], &mut recorder);
        assert_eq!(world.locked_targets("a1"), Some(&[][..]));
        assert_eq!(recorder.locks.last(), Some(&(ObjectId::from("a1"), vec![])));
    }

    #[test]
    fn lock_updates_on_the_source_resolve_immediately() {
        let world = world_with(&[
            "a1,T=1|2|3|4|5,Type=Air+FixedWing",
            "b2,T=1|2|3|4|5,Type=Sea+Watercraft",
            "a1,LockedTarget=b2,LockedTarget1=0,LockedTarget2=nope",
        ]);
        assert_eq!(
            world.locked_targets("a1"),
            Some(&[ObjectId::from("b2")][..])
        );
    }

    #[test]
    fn bullseye_prefers_reserved_id() {
        let world = world_with(&[
            "be1,T=1|2|0|100|200,Type=Navaid+Static+Bullseye",
            "7fffffffffffffff,T=1|2|0|300|400|0,Type=Navaid+Static+Bullseye",
        ]);
        assert_eq!(
            WorldStateView::bullseye_position(&world),
            WorldPos::new(300.0, 400.0)
        );
    }

    #[test]
    fn bullseye_falls_back_to_class_then_origin() {
        let world = world_with(&["be1,T=1|2|0|100|200,Type=Navaid+Static+Bullseye"]);
        assert_eq!(
            WorldStateView::bullseye_position(&world),
            WorldPos::new(100.0, 200.0)
        );

        let empty = WorldState::new();
        assert_eq!(WorldStateView::bullseye_position(&empty), WorldPos::ORIGIN);
    }

    #[test]
    fn bullseye_relative_readout() {
        let world = world_with(&["be1,T=1|2|0|0|0,Type=Navaid+Static+Bullseye"]);
        let (bearing, range) = world.bullseye_relative(WorldPos::new(1852.0, 0.0));
        assert!((bearing - 90.0).abs() < 1e-9);
        assert!((range - 1.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_scan_respects_range_and_visibility() {
        let mut world = world_with(&[
            "a1,T=1|2|3|0|0,Type=Air+FixedWing",
            "b2,T=1|2|3|100|0,Type=Ground+Vehicle",
        ]);
        let near = world.nearest_entity(&world, WorldPos::new(90.0, 0.0), 50.0);
        assert_eq!(near.map(|e| e.id().as_str()), Some("b2"));
        assert!(world.nearest_entity(&world, WorldPos::new(500.0, 0.0), 50.0).is_none());

        assert!(world.modify_entity("b2", &mut (), Entity::hide));
        let near = world.nearest_entity(&world, WorldPos::new(90.0, 0.0), 500.0);
        assert_eq!(near.map(|e| e.id().as_str()), Some("a1"));
    }

    #[test]
    fn clear_empties_everything() {
        let mut recorder = Recorder::default();
        let mut world = world_with(&[
            "0,Title=x",
            "#5",
            "a1,T=1|2|3|0|0,Type=Air+FixedWing",
            "b2,T=1|2|3|100|0,Type=Ground+Vehicle",
        ]);
        world.clear(&mut recorder);
        assert!(world.is_empty());
        assert_eq!(world.global("Title"), None);
        assert_eq!(recorder.removed.len(), 2);
        assert_eq!(world.decoder().relative_time(), 0.0);
        assert!(world.is_consistent());
    }

    #[test]
    fn works_as_an_analyzer() {
        let mut decoder = Decoder::new();
        let mut world = WorldState::new();
        for line in ["#1", "a1,T=1|2|3|4|5,Type=Air+Rotorcraft"] {
            if let Some(record) = decoder.decode_line(line) {
                world.process(&record);
            }
        }
        world.finish();
        assert_eq!(world.entities_of(ObjectClass::RotaryWing).count(), 1);
        assert_eq!(WorldStateView::clock(&world), decoder.now());
    }
}

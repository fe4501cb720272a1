use std::collections::{HashMap, HashSet};

use crate::classification::ObjectClass;
use crate::decoder::Properties;
use crate::entity::Entity;
use crate::types::{ObjectId, Timestamp, WorldPos};

/// Readonly view into WorldState.
///
/// Observers receive this instead of the concrete state so they cannot
/// mutate the entity table while it is being updated.
pub trait WorldStateView {
    /// Absolute time of the current frame
    fn clock(&self) -> Timestamp;

    /// All live entities
    fn entities(&self) -> &HashMap<ObjectId, Entity>;

    /// Ids of the live entities of one class
    fn ids_of(&self, class: ObjectClass) -> Option<&HashSet<ObjectId>>;

    /// Properties of the global object, last write wins
    fn globals(&self) -> &Properties;

    /// Position of the reference point used for bearing/range readouts
    fn bullseye_position(&self) -> WorldPos;

    fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities().get(id)
    }
}

/// Hit-testing over entity positions.
pub trait SpatialIndex {
    /// Id of the entity closest to `point`, if any lies within `max_distance`
    /// meters.
    fn nearest(&self, point: WorldPos, max_distance: f64) -> Option<ObjectId>;
}

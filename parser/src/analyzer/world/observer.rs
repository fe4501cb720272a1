use crate::entity::Entity;
use crate::types::ObjectId;

use super::listener::WorldStateView;

/// Receives entity table changes as WorldState applies records.
///
/// Callbacks run after the change is applied, so `world` already reflects it.
pub trait WorldObserver {
    /// An entity was created or changed.
    fn entity_upserted(&mut self, _entity: &Entity, _world: &dyn WorldStateView) {}

    /// An entity left the table.
    fn entity_removed(&mut self, _id: &ObjectId, _world: &dyn WorldStateView) {}

    /// The resolved lock targets of `entity` changed because another entity
    /// appeared or disappeared.
    fn locks_changed(&mut self, _entity: &Entity, _world: &dyn WorldStateView) {}
}

impl WorldObserver for () {}

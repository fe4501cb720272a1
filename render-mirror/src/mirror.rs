use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::{debug, trace};

use acmi_telemetry::analyzer::world::{SpatialIndex, WorldObserver, WorldStateView};
use acmi_telemetry::entity::Entity;
use acmi_telemetry::types::{ObjectId, Rgba, WorldPos};

use crate::instance::{
    DEFAULT_ICON_SCALE, DEFAULT_LOCK_LINE_GAIN, IconInstance, IconSet, IconShape, LockLine, LockPair, VelocityVector, icon_style,
};
use crate::packed::{DEFAULT_CAPACITY, MemoryReport, PackedArray};

/// Tunables for [`RenderMirror`].
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorOptions {
    pub icon_set: IconSet,
    pub icon_scale: f32,
    pub initial_capacity: usize,
    pub show_velocity_vectors: bool,
    /// Aircraft at or below this CAS get no velocity vector
    pub min_vector_cas: f64,
    pub show_lock_lines: bool,
    pub lock_line_gain: f32,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        MirrorOptions {
            icon_set: IconSet::Classic,
            icon_scale: DEFAULT_ICON_SCALE,
            initial_capacity: DEFAULT_CAPACITY,
            show_velocity_vectors: true,
            min_vector_cas: 0.0,
            show_lock_lines: true,
            lock_line_gain: DEFAULT_LOCK_LINE_GAIN,
        }
    }
}

/// Read-only snapshot of every facet's dense range.
#[derive(Debug)]
pub struct Frame<'a> {
    pub icons: Vec<(IconShape, &'a [IconInstance])>,
    pub velocity_vectors: &'a [VelocityVector],
    pub lock_lines: &'a [LockLine],
}

impl Frame<'_> {
    pub fn icon_count(&self) -> usize {
        self.icons.iter().map(|(_, batch)| batch.len()).sum()
    }
}

/// Packed, upload-ready mirror of the visible world.
pub struct RenderMirror {
    options: MirrorOptions,
    icons: BTreeMap<IconShape, PackedArray<ObjectId, IconInstance>>,
    /// Batch currently holding each entity's icon.
    icon_shape_of: HashMap<ObjectId, IconShape>,
    velocity_vectors: PackedArray<ObjectId, VelocityVector>,
    lock_lines: PackedArray<LockPair, LockLine>,
    /// Lock lines touching each entity, as source or target.
    lines_by_entity: HashMap<ObjectId, HashSet<LockPair>>,
}

impl Default for RenderMirror {
    fn default() -> Self {
        Self::new(MirrorOptions::default())
    }
}

impl RenderMirror {
    pub fn new(options: MirrorOptions) -> Self {
        let capacity = options.initial_capacity;
        let icons = IconShape::iter()
            .map(|shape| (shape, PackedArray::with_capacity(capacity)))
            .collect();
        RenderMirror {
            icons,
            icon_shape_of: HashMap::new(),
            velocity_vectors: PackedArray::with_capacity(capacity),
            lock_lines: PackedArray::with_capacity(capacity / 2),
            lines_by_entity: HashMap::new(),
            options,
        }
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    /// Add or refresh every facet of `entity`.
    pub fn upsert_entity(&mut self, entity: &Entity, world: &dyn WorldStateView) {
        if !entity.is_visible() {
            trace!("{} hidden, dropping from mirror", entity.id());
            self.remove_entity(entity.id());
            return;
        }

        let style = icon_style(self.options.icon_set, entity.class(), &entity.labels.coalition);
        let style_color = style.and_then(|(_, color)| color);
        let color = display_color(entity, style_color);

        self.sync_icon(entity, style.map(|(shape, _)| shape), color);
        self.sync_velocity_vector(entity, color);
        self.sync_locks(entity, world);
        self.refresh_lines_touching(entity.id(), world);
    }

    fn sync_icon(&mut self, entity: &Entity, shape: Option<IconShape>, color: Rgba) {
        let id = entity.id();
        let previous = self.icon_shape_of.get(id).copied();
        if previous.is_some() && previous != shape {
            self.remove_icon(id);
        }
        let Some(shape) = shape else {
            return;
        };

        let instance = IconInstance::new(entity, color, self.options.icon_scale);
        if let Some(batch) = self.icons.get_mut(&shape) {
            batch.update(id.clone(), instance);
            self.icon_shape_of.insert(id.clone(), shape);
        }
    }

    fn remove_icon(&mut self, id: &ObjectId) {
        if let Some(shape) = self.icon_shape_of.remove(id) {
            if let Some(batch) = self.icons.get_mut(&shape) {
                batch.remove(id);
            }
        }
    }

    fn sync_velocity_vector(&mut self, entity: &Entity, color: Rgba) {
        let moving = entity.is_air() && entity.flight.cas > self.options.min_vector_cas;
        if self.options.show_velocity_vectors && moving {
            self.velocity_vectors
                .update(entity.id().clone(), VelocityVector::new(entity, color));
        } else {
            self.velocity_vectors.remove(entity.id());
        }
    }

    /// Make the lock lines sourced at `entity` match its resolved targets.
    pub fn sync_locks(&mut self, entity: &Entity, world: &dyn WorldStateView) {
        let source = entity.id();
        let desired: HashSet<LockPair> = if self.options.show_lock_lines && entity.is_visible() {
            entity
                .locked_targets()
                .iter()
                .filter(|target| world.entity(target.as_str()).is_some_and(Entity::is_visible))
                .map(|target| LockPair::new(source.clone(), target.clone()))
                .collect()
        } else {
            HashSet::new()
        };

        let stale: Vec<LockPair> = self
            .lines_by_entity
            .get(source)
            .into_iter()
            .flatten()
            .filter(|pair| &pair.source == source && !desired.contains(*pair))
            .cloned()
            .collect();
        for pair in stale {
            self.remove_line(&pair);
        }

        for pair in desired {
            self.upsert_line(pair, world);
        }
    }

    /// Recompute the geometry of every line with `id` at either end.
    fn refresh_lines_touching(&mut self, id: &ObjectId, world: &dyn WorldStateView) {
        let pairs: Vec<LockPair> = self
            .lines_by_entity
            .get(id)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        for pair in pairs {
            self.upsert_line(pair, world);
        }
    }

    fn upsert_line(&mut self, pair: LockPair, world: &dyn WorldStateView) {
        let endpoints = world
            .entity(pair.source.as_str())
            .zip(world.entity(pair.target.as_str()));
        let Some((source, target)) = endpoints else {
            self.remove_line(&pair);
            return;
        };

        let style = icon_style(self.options.icon_set, source.class(), &source.labels.coalition);
        let color = display_color(source, style.and_then(|(_, color)| color));
        let line = LockLine::new(source, target, color, self.options.lock_line_gain);
        self.lock_lines.update(pair.clone(), line);
        self.lines_by_entity
            .entry(pair.source.clone())
            .or_default()
            .insert(pair.clone());
        self.lines_by_entity
            .entry(pair.target.clone())
            .or_default()
            .insert(pair);
    }

    fn remove_line(&mut self, pair: &LockPair) {
        self.lock_lines.remove(pair);
        for end in [&pair.source, &pair.target] {
            if let Some(pairs) = self.lines_by_entity.get_mut(end) {
                pairs.remove(pair);
                if pairs.is_empty() {
                    self.lines_by_entity.remove(end);
                }
            }
        }
    }

    /// Drop `id` from every facet: its icon, its velocity vector and every
    /// lock line it sources or receives.
    pub fn remove_entity(&mut self, id: &ObjectId) {
        self.remove_icon(id);
        self.velocity_vectors.remove(id);
        if let Some(pairs) = self.lines_by_entity.remove(id) {
            for pair in pairs {
                self.remove_line(&pair);
            }
        }
    }

    /// Rebuild every facet from `world`, e.g. after the icon set changed.
    pub fn rebuild(&mut self, world: &dyn WorldStateView) {
        self.clear();
        for entity in world.entities().values() {
            self.upsert_entity(entity, world);
        }
        debug!("rebuilt mirror with {} icons", self.icon_count());
    }

    pub fn set_options(&mut self, options: MirrorOptions, world: &dyn WorldStateView) {
        self.options = options;
        self.rebuild(world);
    }

    pub fn clear(&mut self) {
        for batch in self.icons.values_mut() {
            batch.clear();
        }
        self.icon_shape_of.clear();
        self.velocity_vectors.clear();
        self.lock_lines.clear();
        self.lines_by_entity.clear();
    }

    pub fn frame(&self) -> Frame<'_> {
        Frame {
            icons: self
                .icons
                .iter()
                .filter(|(_, batch)| !batch.is_empty())
                .map(|(shape, batch)| (*shape, batch.active_view()))
                .collect(),
            velocity_vectors: self.velocity_vectors.active_view(),
            lock_lines: self.lock_lines.active_view(),
        }
    }

    pub fn icons(&self, shape: IconShape) -> Option<&PackedArray<ObjectId, IconInstance>> {
        self.icons.get(&shape)
    }

    pub fn icon_shape_of(&self, id: &str) -> Option<IconShape> {
        self.icon_shape_of.get(id).copied()
    }

    pub fn velocity_vectors(&self) -> &PackedArray<ObjectId, VelocityVector> {
        &self.velocity_vectors
    }

    pub fn lock_lines(&self) -> &PackedArray<LockPair, LockLine> {
        &self.lock_lines
    }

    pub fn icon_count(&self) -> usize {
        self.icons.values().map(PackedArray::len).sum()
    }

    pub fn memory_report(&self) -> Vec<FacetReport> {
        let mut reports: Vec<FacetReport> = self
            .icons
            .iter()
            .map(|(shape, batch)| FacetReport {
                facet: format!("icons/{shape}"),
                memory: batch.memory_report(),
            })
            .collect();
        reports.push(FacetReport {
            facet: "velocity_vectors".to_string(),
            memory: self.velocity_vectors.memory_report(),
        });
        reports.push(FacetReport {
            facet: "lock_lines".to_string(),
            memory: self.lock_lines.memory_report(),
        });
        reports
    }

    /// Panics if any facet's mappings are inconsistent.
    pub fn assert_invariants(&self) {
        for (shape, batch) in &self.icons {
            batch.assert_invariants();
            for id in batch.ids() {
                assert_eq!(self.icon_shape_of.get(id), Some(shape));
            }
        }
        assert_eq!(self.icon_shape_of.len(), self.icon_count());
        self.velocity_vectors.assert_invariants();
        self.lock_lines.assert_invariants();
        for pair in self.lock_lines.ids() {
            for end in [&pair.source, &pair.target] {
                assert!(self.lines_by_entity.get(end).is_some_and(|p| p.contains(pair)));
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FacetReport {
    pub facet: String,
    pub memory: MemoryReport,
}

/// User override, then icon set color, then the `Color` property.
fn display_color(entity: &Entity, style_color: Option<Rgba>) -> Rgba {
    entity
        .override_color()
        .or(style_color)
        .unwrap_or_else(|| entity.property_color())
}

impl WorldObserver for RenderMirror {
    fn entity_upserted(&mut self, entity: &Entity, world: &dyn WorldStateView) {
        self.upsert_entity(entity, world);
    }

    fn entity_removed(&mut self, id: &ObjectId, _world: &dyn WorldStateView) {
        self.remove_entity(id);
    }

    fn locks_changed(&mut self, entity: &Entity, world: &dyn WorldStateView) {
        self.sync_locks(entity, world);
    }
}

/// Nearest icon, scanning the packed position arrays.
impl SpatialIndex for RenderMirror {
    fn nearest(&self, point: WorldPos, max_distance: f64) -> Option<ObjectId> {
        let (px, py) = (point.u as f32, point.v as f32);
        let mut best: Option<(f32, &ObjectId)> = None;
        for batch in self.icons.values() {
            let distances = batch.active_view().iter().map(|icon| {
                let dx = icon.position[0] - px;
                let dy = icon.position[1] - py;
                dx * dx + dy * dy
            });
            for (index, distance) in distances.enumerate() {
                if best.is_none_or(|(d, _)| distance < d) {
                    if let Some(id) = batch.id_at(index) {
                        best = Some((distance, id));
                    }
                }
            }
        }

        let limit = (max_distance * max_distance) as f32;
        best.filter(|(distance, _)| *distance <= limit)
            .map(|(_, id)| id.clone())
    }
}

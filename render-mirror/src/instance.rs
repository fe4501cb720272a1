use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use acmi_telemetry::classification::ObjectClass;
use acmi_telemetry::entity::Entity;
use acmi_telemetry::types::{ObjectId, Rgba};

/// Default icon scale factor.
pub const DEFAULT_ICON_SCALE: f32 = 10.0;
/// Lock lines are drawn this much brighter than their source.
pub const DEFAULT_LOCK_LINE_GAIN: f32 = 1.2;

/// One icon in a per-shape batch.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct IconInstance {
    /// World U/V, meters
    pub position: [f32; 2],
    pub scale: f32,
    pub _pad: f32,
    /// RGBA, 0..1
    pub color: [f32; 4],
}

/// Velocity leader for an aircraft. The end point is derived on the GPU.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VelocityVector {
    pub start: [f32; 2],
    pub color: [f32; 4],
    /// Degrees, clockwise from north
    pub heading: f32,
    /// Calibrated airspeed
    pub velocity: f32,
}

/// Segment from a locking entity to its target.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LockLine {
    pub start: [f32; 2],
    pub end: [f32; 2],
    pub color: [f32; 4],
}

impl IconInstance {
    pub fn new(entity: &Entity, color: Rgba, scale: f32) -> Self {
        IconInstance {
            position: position_of(entity),
            scale,
            _pad: 0.0,
            color: normalize_color(color),
        }
    }
}

impl VelocityVector {
    pub fn new(entity: &Entity, color: Rgba) -> Self {
        VelocityVector {
            start: position_of(entity),
            color: normalize_color(color),
            heading: entity.heading() as f32,
            velocity: entity.flight.cas as f32,
        }
    }
}

impl LockLine {
    pub fn new(source: &Entity, target: &Entity, source_color: Rgba, gain: f32) -> Self {
        let color = normalize_color(source_color).map(|c| (c * gain).min(1.0));
        LockLine {
            start: position_of(source),
            end: position_of(target),
            color,
        }
    }
}

fn position_of(entity: &Entity) -> [f32; 2] {
    let pos = entity.position();
    [pos.u as f32, pos.v as f32]
}

/// A color with any channel above 1.0 is taken as 0..255 and rescaled as a
/// whole.
pub fn normalize_color(color: Rgba) -> Rgba {
    if color.iter().any(|&c| c > 1.0) {
        color.map(|c| c / 255.0)
    } else {
        color
    }
}

/// Key of a lock line, displayed as `source:target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LockPair {
    pub source: ObjectId,
    pub target: ObjectId,
}

impl LockPair {
    pub fn new(source: ObjectId, target: ObjectId) -> Self {
        LockPair { source, target }
    }

    pub fn involves(&self, id: &ObjectId) -> bool {
        &self.source == id || &self.target == id
    }
}

impl fmt::Display for LockPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)
    }
}

/// Icon outlines available to the renderer. Each shape is its own batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumString, EnumIter,
)]
pub enum IconShape {
    Circle,
    Square,
    Semicircle,
    Diamond,
    HalfDiamond,
    TopBox,
    Ship,
}

/// Symbology used to pick shapes and colors.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IconSet {
    /// Shape per class, Tacview colors
    #[default]
    Classic,
    /// Shape and color per class and coalition
    Ntds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Friendly,
    Hostile,
    Unknown,
}

fn side_of(coalition: &str) -> Side {
    if coalition.contains("Blue") || coalition.contains("US") {
        Side::Friendly
    } else if coalition.contains("Red") || coalition.contains("OPFOR") {
        Side::Hostile
    } else {
        Side::Unknown
    }
}

fn rgb(r: u8, g: u8, b: u8) -> Rgba {
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0]
}

/// Icon shape and optional color override for an entity. `None` means the
/// entity gets no icon.
pub fn icon_style(set: IconSet, class: ObjectClass, coalition: &str) -> Option<(IconShape, Option<Rgba>)> {
    match set {
        IconSet::Classic => {
            let shape = match class {
                ObjectClass::FixedWing | ObjectClass::RotaryWing => IconShape::Square,
                ObjectClass::Missile => IconShape::Diamond,
                ObjectClass::Ground => IconShape::Circle,
                ObjectClass::Sea => IconShape::Ship,
                ObjectClass::Bullseye => return None,
            };
            Some((shape, None))
        }
        IconSet::Ntds => {
            let side = side_of(coalition);
            let (shape, color) = match (class, side) {
                (ObjectClass::FixedWing, Side::Friendly) => (IconShape::Square, rgb(0, 100, 255)),
                (ObjectClass::FixedWing, Side::Hostile) => (IconShape::Diamond, rgb(255, 50, 50)),
                (ObjectClass::FixedWing, Side::Unknown) => (IconShape::Circle, rgb(255, 255, 0)),
                (ObjectClass::RotaryWing, Side::Friendly) => (IconShape::Semicircle, rgb(0, 150, 255)),
                (ObjectClass::RotaryWing, Side::Hostile) => (IconShape::HalfDiamond, rgb(255, 50, 50)),
                (ObjectClass::RotaryWing, Side::Unknown) => (IconShape::Semicircle, rgb(255, 255, 0)),
                (ObjectClass::Missile, Side::Friendly) => (IconShape::TopBox, rgb(100, 200, 255)),
                (ObjectClass::Missile, Side::Hostile) => (IconShape::TopBox, rgb(255, 100, 100)),
                (ObjectClass::Missile, Side::Unknown) => (IconShape::TopBox, rgb(255, 255, 100)),
                (ObjectClass::Ground, Side::Friendly) => (IconShape::Square, rgb(0, 100, 200)),
                (ObjectClass::Ground, Side::Hostile) => (IconShape::Square, rgb(200, 50, 50)),
                (ObjectClass::Ground, Side::Unknown) => (IconShape::Square, rgb(150, 150, 0)),
                (ObjectClass::Sea, Side::Friendly) => (IconShape::Ship, rgb(0, 150, 255)),
                (ObjectClass::Sea, Side::Hostile) => (IconShape::Ship, rgb(255, 50, 50)),
                (ObjectClass::Sea, Side::Unknown) => (IconShape::Ship, rgb(255, 255, 0)),
                (ObjectClass::Bullseye, _) => (IconShape::Circle, rgb(255, 255, 255)),
            };
            Some((shape, Some(color)))
        }
    }
}

use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::trace;

use crate::classification::ObjectClass;
use crate::decoder::{ORIENTATION_KEY, OrientationField, Properties, PropertyValue, parse_float};
use crate::types::{ObjectId, Rgba, Timestamp, WorldPos};

/// Number of `LockedTarget`, `LockedTarget1` .. `LockedTarget9` slots.
pub const LOCK_SLOTS: usize = 10;

pub const DEFAULT_COLOR: &str = "White";

const WHITE: Rgba = [1.0, 1.0, 1.0, 1.0];

/// Scalar flight data carried as top-level properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, EnumIter)]
pub enum NumericField {
    #[strum(serialize = "AOA")]
    Aoa,
    #[strum(serialize = "AOS")]
    Aos,
    #[strum(serialize = "CAS")]
    Cas,
    FuelWeight,
    Health,
    #[strum(serialize = "IAS")]
    Ias,
    LateralGForce,
    LongitudinalGForce,
    Mach,
    VerticalGForce,
}

/// Text properties tracked per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TextField {
    Coalition,
    Color,
    Name,
    Pilot,
    Type,
    CallSign,
    Group,
    /// `LockedTarget` is slot 0, `LockedTarget1` .. `LockedTarget9` follow.
    LockedTarget(usize),
}

impl TextField {
    pub fn from_key(key: &str) -> Option<TextField> {
        let field = match key {
            "Coalition" => TextField::Coalition,
            "Color" => TextField::Color,
            "Name" => TextField::Name,
            "Pilot" => TextField::Pilot,
            "Type" => TextField::Type,
            "CallSign" => TextField::CallSign,
            "Group" => TextField::Group,
            "LockedTarget" => TextField::LockedTarget(0),
            _ => {
                let slot = key.strip_prefix("LockedTarget")?;
                match slot.parse::<usize>() {
                    Ok(n @ 1..=9) if slot.len() == 1 => TextField::LockedTarget(n),
                    _ => return None,
                }
            }
        };
        Some(field)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct FlightData {
    /// Angle of attack, degrees
    pub aoa: f64,
    /// Angle of sideslip, degrees
    pub aos: f64,
    /// Calibrated airspeed, m/s
    pub cas: f64,
    pub fuel_weight: f64,
    /// 0..1
    pub health: f64,
    /// Indicated airspeed, m/s
    pub ias: f64,
    pub lateral_g: f64,
    pub longitudinal_g: f64,
    pub mach: f64,
    pub vertical_g: f64,
}

impl FlightData {
    pub fn get(&self, field: NumericField) -> f64 {
        match field {
            NumericField::Aoa => self.aoa,
            NumericField::Aos => self.aos,
            NumericField::Cas => self.cas,
            NumericField::FuelWeight => self.fuel_weight,
            NumericField::Health => self.health,
            NumericField::Ias => self.ias,
            NumericField::LateralGForce => self.lateral_g,
            NumericField::LongitudinalGForce => self.longitudinal_g,
            NumericField::Mach => self.mach,
            NumericField::VerticalGForce => self.vertical_g,
        }
    }

    fn slot_mut(&mut self, field: NumericField) -> &mut f64 {
        match field {
            NumericField::Aoa => &mut self.aoa,
            NumericField::Aos => &mut self.aos,
            NumericField::Cas => &mut self.cas,
            NumericField::FuelWeight => &mut self.fuel_weight,
            NumericField::Health => &mut self.health,
            NumericField::Ias => &mut self.ias,
            NumericField::LateralGForce => &mut self.lateral_g,
            NumericField::LongitudinalGForce => &mut self.longitudinal_g,
            NumericField::Mach => &mut self.mach,
            NumericField::VerticalGForce => &mut self.vertical_g,
        }
    }
}

/// Flattened `T` property.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct Orientation {
    pub longitude: f64,
    pub latitude: f64,
    /// Meters above sea level
    pub altitude: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    /// Meters east of the map origin
    pub u: f64,
    /// Meters north of the map origin
    pub v: f64,
    /// Degrees, clockwise from north
    pub heading: f64,
}

impl Orientation {
    pub fn get(&self, field: OrientationField) -> f64 {
        match field {
            OrientationField::Longitude => self.longitude,
            OrientationField::Latitude => self.latitude,
            OrientationField::Altitude => self.altitude,
            OrientationField::Roll => self.roll,
            OrientationField::Pitch => self.pitch,
            OrientationField::Yaw => self.yaw,
            OrientationField::U => self.u,
            OrientationField::V => self.v,
            OrientationField::Heading => self.heading,
        }
    }

    fn slot_mut(&mut self, field: OrientationField) -> &mut f64 {
        match field {
            OrientationField::Longitude => &mut self.longitude,
            OrientationField::Latitude => &mut self.latitude,
            OrientationField::Altitude => &mut self.altitude,
            OrientationField::Roll => &mut self.roll,
            OrientationField::Pitch => &mut self.pitch,
            OrientationField::Yaw => &mut self.yaw,
            OrientationField::U => &mut self.u,
            OrientationField::V => &mut self.v,
            OrientationField::Heading => &mut self.heading,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Labels {
    pub coalition: String,
    pub color: String,
    pub name: String,
    pub pilot: String,
    /// Raw `Type` property, e.g. `Air+FixedWing`
    pub kind: String,
    pub call_sign: String,
    pub group: String,
    pub locked_targets: [String; LOCK_SLOTS],
}

impl Default for Labels {
    fn default() -> Self {
        Labels {
            coalition: String::new(),
            color: DEFAULT_COLOR.to_string(),
            name: String::new(),
            pilot: String::new(),
            kind: String::new(),
            call_sign: String::new(),
            group: String::new(),
            locked_targets: Default::default(),
        }
    }
}

impl Labels {
    pub fn get(&self, field: TextField) -> &str {
        match field {
            TextField::Coalition => &self.coalition,
            TextField::Color => &self.color,
            TextField::Name => &self.name,
            TextField::Pilot => &self.pilot,
            TextField::Type => &self.kind,
            TextField::CallSign => &self.call_sign,
            TextField::Group => &self.group,
            TextField::LockedTarget(slot) => &self.locked_targets[slot],
        }
    }

    fn slot_mut(&mut self, field: TextField) -> &mut String {
        match field {
            TextField::Coalition => &mut self.coalition,
            TextField::Color => &mut self.color,
            TextField::Name => &mut self.name,
            TextField::Pilot => &mut self.pilot,
            TextField::Type => &mut self.kind,
            TextField::CallSign => &mut self.call_sign,
            TextField::Group => &mut self.group,
            TextField::LockedTarget(slot) => &mut self.locked_targets[slot],
        }
    }
}

/// Normalized RGBA for a Tacview color name. Unknown names are white.
pub fn color_from_name(name: &str) -> Rgba {
    match name {
        "White" => WHITE,
        "Green" => [0.0, 1.0, 0.0, 1.0],
        "Blue" => [0.0, 0.0, 1.0, 1.0],
        "Brown" => [0.5, 0.25, 0.0, 1.0],
        "Orange" => [1.0, 0.5, 0.0, 1.0],
        "Yellow" => [1.0, 1.0, 0.0, 1.0],
        "Red" => [1.0, 0.0, 0.0, 1.0],
        "Black" => [0.0, 0.0, 0.0, 1.0],
        "Cyan" => [0.0, 1.0, 1.0, 1.0],
        "Violet" => [0.5, 0.0, 1.0, 1.0],
        "Grey" => [0.5, 0.5, 0.5, 1.0],
        _ => WHITE,
    }
}

/// The live state of one tracked telemetry object.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    id: ObjectId,
    class: ObjectClass,
    timestamp: Timestamp,
    pub flight: FlightData,
    pub orientation: Orientation,
    pub labels: Labels,
    color_rgba: Rgba,
    override_name: Option<String>,
    override_color: Option<Rgba>,
    visible: bool,
    /// Lock slots that pointed at a live object at the last resolution.
    resolved_locks: Vec<ObjectId>,
}

impl Entity {
    pub fn new(id: ObjectId, class: ObjectClass) -> Self {
        Entity {
            id,
            class,
            timestamp: Timestamp::default(),
            flight: FlightData::default(),
            orientation: Orientation::default(),
            labels: Labels::default(),
            color_rgba: WHITE,
            override_name: None,
            override_color: None,
            visible: true,
            resolved_locks: Vec::new(),
        }
    }

    /// Create an entity from its first update. Returns `None` when the `Type`
    /// property is missing or names no tracked class.
    pub fn from_update(id: ObjectId, timestamp: Timestamp, properties: &Properties) -> Option<Self> {
        let kind = properties.get("Type").and_then(PropertyValue::text_ref)?;
        let class = ObjectClass::from_type_str(kind)?;
        let mut entity = Entity::new(id, class);
        entity.apply_delta(timestamp, properties);
        Some(entity)
    }

    /// Merge a partial update. Absent or empty numeric values never overwrite
    /// known state. Text values overwrite whenever their key is present.
    pub fn apply_delta(&mut self, timestamp: Timestamp, properties: &Properties) {
        self.timestamp = timestamp;
        if properties.is_empty() {
            return;
        }

        // The compound goes first so scalar keys on the same line override it.
        if let Some(PropertyValue::Orientation(delta)) = properties.get(ORIENTATION_KEY) {
            for (field, parsed) in delta.present() {
                *self.orientation.slot_mut(field) = parsed;
            }
        }
        for (key, value) in properties {
            if let PropertyValue::Text(raw) = value {
                self.apply_text(key, raw);
            }
        }

        self.color_rgba = color_from_name(&self.labels.color);
    }

    fn apply_text(&mut self, key: &str, raw: &str) {
        if let Ok(field) = NumericField::from_str(key) {
            if let Some(parsed) = coerce(raw) {
                *self.flight.slot_mut(field) = parsed;
            }
        } else if let Ok(field) = OrientationField::from_str(key) {
            if let Some(parsed) = coerce(raw) {
                *self.orientation.slot_mut(field) = parsed;
            }
        } else if let Some(field) = TextField::from_key(key) {
            *self.labels.slot_mut(field) = raw.to_string();
        } else {
            trace!("{}: ignoring property {key}", self.id);
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn class(&self) -> ObjectClass {
        self.class
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn position(&self) -> WorldPos {
        WorldPos::new(self.orientation.u, self.orientation.v)
    }

    pub fn heading(&self) -> f64 {
        self.orientation.heading
    }

    pub fn is_air(&self) -> bool {
        self.class.is_air()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Best available label: override, `CallSign (Pilot)`, pilot, name,
    /// type, then the raw id.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.override_name {
            return name.clone();
        }
        let labels = &self.labels;
        match (labels.call_sign.is_empty(), labels.pilot.is_empty()) {
            (false, false) => format!("{} ({})", labels.call_sign, labels.pilot),
            (false, true) => labels.call_sign.clone(),
            (true, false) => labels.pilot.clone(),
            (true, true) if !labels.name.is_empty() => labels.name.clone(),
            (true, true) if !labels.kind.is_empty() => labels.kind.clone(),
            (true, true) => self.id.to_string(),
        }
    }

    /// Effective display color, honoring any user override.
    pub fn color(&self) -> Rgba {
        self.override_color.unwrap_or(self.color_rgba)
    }

    /// Color derived from the `Color` property alone.
    pub fn property_color(&self) -> Rgba {
        self.color_rgba
    }

    pub fn override_color(&self) -> Option<Rgba> {
        self.override_color
    }

    pub fn override_name(&self) -> Option<&str> {
        self.override_name.as_deref()
    }

    pub fn change_name(&mut self, name: impl Into<String>) {
        self.override_name = Some(name.into());
    }

    pub fn change_color(&mut self, color: Rgba) {
        self.override_color = Some(color);
    }

    pub fn clear_overrides(&mut self) {
        self.override_name = None;
        self.override_color = None;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    /// Non-empty lock slots, in slot order. `0` means "no lock".
    pub fn lock_slots(&self) -> impl Iterator<Item = &str> {
        self.labels
            .locked_targets
            .iter()
            .map(String::as_str)
            .filter(|target| !target.is_empty() && *target != "0")
    }

    /// Resolve lock slots against the live object map. Ids that are not live
    /// are skipped.
    pub fn resolve_locked_targets<V>(&self, live: &HashMap<ObjectId, V>) -> Vec<ObjectId> {
        self.lock_slots()
            .filter_map(|target| match live.get_key_value(target) {
                Some((id, _)) => Some(id.clone()),
                None => {
                    trace!("{}: lock target {target} is not live", self.id);
                    None
                }
            })
            .collect()
    }

    pub fn set_locked_targets(&mut self, targets: Vec<ObjectId>) {
        self.resolved_locks = targets;
    }

    pub fn locked_targets(&self) -> &[ObjectId] {
        &self.resolved_locks
    }
}

fn coerce(raw: &str) -> Option<f64> {
    if raw.trim().is_empty() {
        return None;
    }
    parse_float(raw)
}

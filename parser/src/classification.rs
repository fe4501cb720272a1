use serde::Serialize;
use strum_macros::{Display, EnumIter, EnumString};

/// Coarse category of a telemetry object, derived once from its `Type`
/// property when the object is first seen.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumString, EnumIter,
)]
pub enum ObjectClass {
    FixedWing,
    RotaryWing,
    Missile,
    Ground,
    Sea,
    Bullseye,
}

/// `Type` substrings, checked in order. The first hit wins.
const TYPE_TABLE: &[(&str, ObjectClass)] = &[
    ("FixedWing", ObjectClass::FixedWing),
    ("Rotorcraft", ObjectClass::RotaryWing),
    ("Missile", ObjectClass::Missile),
    ("Ground+Vehicle", ObjectClass::Ground),
    ("Watercraft", ObjectClass::Sea),
    ("Navaid+Static+Bullseye", ObjectClass::Bullseye),
];

impl ObjectClass {
    /// Classify a `Type` value such as `Air+FixedWing`. Objects matching
    /// nothing (weapons other than missiles, buildings, flares...) yield
    /// `None` and are not tracked.
    pub fn from_type_str(kind: &str) -> Option<ObjectClass> {
        TYPE_TABLE
            .iter()
            .find(|(needle, _)| kind.contains(needle))
            .map(|(_, class)| *class)
    }

    pub fn is_air(self) -> bool {
        matches!(self, ObjectClass::FixedWing | ObjectClass::RotaryWing)
    }

    pub fn is_reference_point(self) -> bool {
        self == ObjectClass::Bullseye
    }
}

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

pub use chrono::{DateTime, Utc};

/// Absolute simulation time of a record.
pub type Timestamp = DateTime<Utc>;

/// Meters per nautical mile.
pub const NM_TO_METERS: f64 = 1852.0;

/// Identifier of a telemetry object as it appears on the wire.
///
/// Identifiers are opaque and case-sensitive. The literal `0` addresses the
/// global object and is remapped to [`ObjectId::GLOBAL`] by the decoder.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub const GLOBAL: &'static str = "global";

    pub fn new(raw: impl Into<String>) -> Self {
        ObjectId(raw.into())
    }

    pub fn global() -> Self {
        ObjectId(Self::GLOBAL.to_string())
    }

    pub fn is_global(&self) -> bool {
        self.0 == Self::GLOBAL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(v: &str) -> Self {
        ObjectId(v.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(v: String) -> Self {
        ObjectId(v)
    }
}

/// Planar world position in meters (ACMI `U`/`V`, flat-world coordinates).
/// U grows east, V grows north.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldPos {
    pub u: f64,
    pub v: f64,
}

impl WorldPos {
    pub const ORIGIN: WorldPos = WorldPos { u: 0.0, v: 0.0 };

    pub fn new(u: f64, v: f64) -> Self {
        WorldPos { u, v }
    }

    pub fn distance_squared(self, other: WorldPos) -> f64 {
        let du = other.u - self.u;
        let dv = other.v - self.v;
        du * du + dv * dv
    }

    /// Range to `other` in nautical miles.
    pub fn range_nm(self, other: WorldPos) -> f64 {
        self.distance_squared(other).sqrt() / NM_TO_METERS
    }

    /// True bearing from `self` to `other` in degrees, in `[0, 360)`.
    pub fn bearing_to(self, other: WorldPos) -> f64 {
        let bearing = (other.u - self.u).atan2(other.v - self.v).to_degrees();
        bearing.rem_euclid(360.0)
    }
}

impl From<(f64, f64)> for WorldPos {
    fn from((u, v): (f64, f64)) -> Self {
        WorldPos { u, v }
    }
}

/// RGBA color with channels normalized to `[0, 1]`.
pub type Rgba = [f32; 4];

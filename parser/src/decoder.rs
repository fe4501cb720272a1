use chrono::{NaiveDateTime, TimeZone};
use kinded::Kinded;
use nom::IResult;
use nom::combinator::all_consuming;
use nom::number::complete::double;
use serde::Serialize;
use std::collections::HashMap;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{debug, trace, warn};
use variantly::Variantly;

use crate::DecodeError;
use crate::types::{ObjectId, Timestamp};

/// Key of the compound position/orientation property.
pub const ORIENTATION_KEY: &str = "T";
/// Global property carrying the absolute time baseline of the recording.
pub const REFERENCE_TIME_KEY: &str = "ReferenceTime";

/// One sub-field of the `T` compound property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, EnumIter)]
pub enum OrientationField {
    Longitude,
    Latitude,
    Altitude,
    Roll,
    Pitch,
    Yaw,
    U,
    V,
    Heading,
}

use OrientationField::*;

/// `lon|lat|alt|u|v`
const FLAT_SIMPLE: [OrientationField; 5] = [Longitude, Latitude, Altitude, U, V];
/// `lon|lat|alt|u|v|<redundant>`, only emitted for the bullseye by some servers.
const SPHERICAL_COMPLEX: [OrientationField; 5] = [Longitude, Latitude, Altitude, U, V];
/// `lon|lat|alt|roll|pitch|yaw|u|v|heading`
const FLAT_COMPLEX: [OrientationField; 9] =
    [Longitude, Latitude, Altitude, Roll, Pitch, Yaw, U, V, Heading];

/// Decoded `T` property. Sub-fields left empty on the wire are `None` and must
/// not overwrite anything when applied.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct OrientationDelta {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub altitude: Option<f64>,
    pub roll: Option<f64>,
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    pub u: Option<f64>,
    pub v: Option<f64>,
    pub heading: Option<f64>,
}

impl OrientationDelta {
    pub fn get(&self, field: OrientationField) -> Option<f64> {
        match field {
            Longitude => self.longitude,
            Latitude => self.latitude,
            Altitude => self.altitude,
            Roll => self.roll,
            Pitch => self.pitch,
            Yaw => self.yaw,
            U => self.u,
            V => self.v,
            Heading => self.heading,
        }
    }

    pub fn set(&mut self, field: OrientationField, value: f64) {
        let slot = match field {
            Longitude => &mut self.longitude,
            Latitude => &mut self.latitude,
            Altitude => &mut self.altitude,
            Roll => &mut self.roll,
            Pitch => &mut self.pitch,
            Yaw => &mut self.yaw,
            U => &mut self.u,
            V => &mut self.v,
            Heading => &mut self.heading,
        };
        *slot = Some(value);
    }

    /// Present sub-fields, in wire order.
    pub fn present(&self) -> impl Iterator<Item = (OrientationField, f64)> {
        FLAT_COMPLEX
            .into_iter()
            .filter_map(|field| self.get(field).map(|value| (field, value)))
    }

    pub fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }
}

/// Raw value of a property as carried by a record.
#[derive(Debug, Clone, PartialEq, Serialize, Variantly)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Orientation(OrientationDelta),
}

pub type Properties = HashMap<String, PropertyValue>;

/// A decoded telemetry line.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    /// `reference_time + relative_time` at the moment the line was decoded.
    pub timestamp: Timestamp,
    pub payload: RecordPayload,
}

#[derive(Debug, Clone, Serialize, Kinded)]
#[serde(tag = "type")]
pub enum RecordPayload {
    /// `#<seconds>` frame marker.
    TimeAdvance { offset: f64 },
    /// `-<id>`
    Remove { id: ObjectId },
    /// Properties of the global object (`0,...`).
    GlobalUpdate { properties: Properties },
    /// Properties of a single object (`<id>,...`).
    EntityUpdate { id: ObjectId, properties: Properties },
}

impl Record {
    pub fn id(&self) -> Option<&ObjectId> {
        match &self.payload {
            RecordPayload::Remove { id } | RecordPayload::EntityUpdate { id, .. } => Some(id),
            RecordPayload::TimeAdvance { .. } | RecordPayload::GlobalUpdate { .. } => None,
        }
    }

    pub fn properties(&self) -> Option<&Properties> {
        match &self.payload {
            RecordPayload::GlobalUpdate { properties }
            | RecordPayload::EntityUpdate { properties, .. } => Some(properties),
            RecordPayload::TimeAdvance { .. } | RecordPayload::Remove { .. } => None,
        }
    }

    /// Text value of `key`, if the record carries it.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.properties()?
            .get(key)
            .and_then(PropertyValue::text_ref)
            .map(String::as_str)
    }

    pub fn orientation(&self) -> Option<&OrientationDelta> {
        self.properties()?
            .get(ORIENTATION_KEY)
            .and_then(PropertyValue::orientation_ref)
    }
}

/// Counters kept by the decoder across its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Lines handed to [`Decoder::decode_line`].
    pub lines: usize,
    /// Lines that produced a record.
    pub records: usize,
    /// Header, comment and blank lines.
    pub ignored: usize,
    /// Lines rejected or truncated because of malformed content.
    pub malformed: usize,
    /// Lines using a schema this decoder does not handle (2-pipe `T`).
    pub unsupported: usize,
}

/// Stateful ACMI line decoder.
///
/// The only state is the relative-time cursor (replaced by every `#` line) and
/// the reference-time baseline (replaced by a global `ReferenceTime` property).
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    relative_time: f64,
    reference_time: Timestamp,
    stats: DecoderStats,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relative_time(&self) -> f64 {
        self.relative_time
    }

    pub fn reference_time(&self) -> Timestamp {
        self.reference_time
    }

    /// Absolute time of the current frame.
    pub fn now(&self) -> Timestamp {
        offset_time(self.reference_time, self.relative_time).unwrap_or(self.reference_time)
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Forget the time cursor and baseline, e.g. when a new feed starts.
    pub fn reset(&mut self) {
        self.relative_time = 0.0;
        self.reference_time = Timestamp::default();
    }

    /// Decode one line (without its trailing newline).
    ///
    /// Returns `None` for lines that carry no record: headers, comments, blank
    /// lines and lines rejected as malformed or unsupported.
    pub fn decode_line(&mut self, line: &str) -> Option<Record> {
        self.stats.lines += 1;
        let line = line.trim();

        if line.is_empty()
            || line.starts_with("FileType")
            || line.starts_with("FileVersion")
            || line.starts_with("//")
        {
            self.stats.ignored += 1;
            return None;
        }

        let record = if let Some(offset) = line.strip_prefix('#') {
            self.decode_time_marker(offset)
        } else if let Some(id) = line.strip_prefix('-') {
            self.decode_remove(id)
        } else {
            self.decode_update(line)
        };

        if record.is_some() {
            self.stats.records += 1;
        }
        record
    }

    fn decode_time_marker(&mut self, offset: &str) -> Option<Record> {
        let Some(offset) = parse_float(offset) else {
            self.malformed(DecodeError::InvalidTimeMarker(offset.to_string()));
            return None;
        };
        let Some(timestamp) = offset_time(self.reference_time, offset) else {
            self.malformed(DecodeError::TimeMarkerOutOfRange(offset));
            return None;
        };
        self.relative_time = offset;
        Some(Record {
            timestamp,
            payload: RecordPayload::TimeAdvance { offset },
        })
    }

    fn decode_remove(&mut self, id: &str) -> Option<Record> {
        let id = id.trim();
        if id.is_empty() {
            warn!("removal line without an object id");
            self.stats.malformed += 1;
            return None;
        }
        Some(Record {
            timestamp: self.now(),
            payload: RecordPayload::Remove { id: ObjectId::from(id) },
        })
    }

    fn decode_update(&mut self, line: &str) -> Option<Record> {
        let mut fields = split_fields(line).into_iter();
        let raw_id = fields.next()?;
        if raw_id.is_empty() {
            warn!("update line without an object id");
            self.stats.malformed += 1;
            return None;
        }
        let is_global = raw_id == "0";

        let mut properties = Properties::new();
        for field in fields {
            let Some((key, value)) = field.split_once('=') else {
                // Keep what was decoded so far.
                self.malformed(DecodeError::MissingSeparator { field });
                break;
            };

            if key == ORIENTATION_KEY {
                match parse_orientation(value) {
                    Ok(Some(delta)) => {
                        properties.insert(key.to_string(), PropertyValue::Orientation(delta));
                    }
                    Ok(None) => {
                        trace!("skipping spherical-world object {raw_id}");
                        self.stats.unsupported += 1;
                        return None;
                    }
                    Err(err) => {
                        self.malformed(err);
                        return None;
                    }
                }
                continue;
            }

            if is_global && key == REFERENCE_TIME_KEY {
                match parse_reference_time(value) {
                    Ok(reference) => {
                        debug!("reference time set to {reference}");
                        self.reference_time = reference;
                    }
                    Err(err) => warn!("{err}"),
                }
            }

            properties.insert(key.to_string(), PropertyValue::Text(value.to_string()));
        }

        let payload = if is_global {
            RecordPayload::GlobalUpdate { properties }
        } else {
            RecordPayload::EntityUpdate {
                id: ObjectId::from(raw_id),
                properties,
            }
        };

        Some(Record {
            timestamp: self.now(),
            payload,
        })
    }

    fn malformed(&mut self, err: DecodeError) {
        warn!("malformed telemetry line: {err}");
        self.stats.malformed += 1;
    }
}

/// `reference` plus `offset` seconds, or `None` outside the representable range.
fn offset_time(reference: Timestamp, offset: f64) -> Option<Timestamp> {
    let micros = (offset * 1_000_000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }
    reference.checked_add_signed(chrono::Duration::microseconds(micros as i64))
}

/// Split a line on commas, honouring `\,` escapes inside values.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

pub(crate) fn parse_float(input: &str) -> Option<f64> {
    let result: IResult<&str, f64> = all_consuming(double)(input.trim());
    result.ok().map(|(_, value)| value)
}

/// Decode a `T` value. `Ok(None)` marks the unsupported 2-pipe schema.
fn parse_orientation(value: &str) -> Result<Option<OrientationDelta>, DecodeError> {
    let pipes = value.matches('|').count();
    let schema: &[OrientationField] = match pipes {
        2 => return Ok(None),
        4 => &FLAT_SIMPLE,
        5 => {
            trace!("discarding redundant sixth T field in {value:?}");
            &SPHERICAL_COMPLEX
        }
        8 => &FLAT_COMPLEX,
        _ => {
            return Err(DecodeError::UnsupportedPipeCount {
                value: value.to_string(),
                pipes,
            });
        }
    };

    let mut delta = OrientationDelta::default();
    for (index, (field, raw)) in schema.iter().zip(value.split('|')).enumerate() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match parse_float(raw) {
            Some(parsed) => delta.set(*field, parsed),
            None => warn!(
                "{}",
                DecodeError::InvalidOrientationValue {
                    index,
                    value: raw.to_string(),
                }
            ),
        }
    }
    Ok(Some(delta))
}

fn parse_reference_time(value: &str) -> Result<Timestamp, DecodeError> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ") {
        return Ok(chrono::Utc.from_utc_datetime(&naive));
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&chrono::Utc))
        .map_err(|_| DecodeError::InvalidReferenceTime(value.to_string()))
}

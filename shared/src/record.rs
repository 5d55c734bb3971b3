//! Telemetry records
//!
//! A record is either produced by a sensor (and stamped by the bridge) or
//! synthesized by the uplink around a payload it could not recognize. The
//! two shapes use different timestamp keys so downstream consumers can tell
//! sensing time from receive time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A water level reading, numeric or free text as the sensor reported it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaterLevel {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for WaterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaterLevel::Number(n) => write!(f, "{}", n),
            WaterLevel::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for WaterLevel {
    fn from(value: u64) -> Self {
        WaterLevel::Number(value.into())
    }
}

impl From<&str> for WaterLevel {
    fn from(value: &str) -> Self {
        WaterLevel::Text(value.to_owned())
    }
}

/// A reading originated by a field sensor
///
/// Sensors have no clock, so `timestamp` is never read from the wire; the
/// bridge fills it from its own clock before forwarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    /// Origin-assigned identifier, opaque to the relays
    pub device_id: String,

    /// Seconds since Unix epoch, set by the bridge
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,

    #[serde(rename = "water_level_cm", alias = "water_level")]
    pub water_level: WaterLevel,
}

impl SensorRecord {
    /// Create an unstamped record
    pub fn new(device_id: impl Into<String>, water_level: impl Into<WaterLevel>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: None,
            water_level: water_level.into(),
        }
    }

    /// Return a copy of this record stamped with `timestamp`
    pub fn with_timestamp(self, timestamp: u64) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..self
        }
    }
}

/// A record synthesized by the uplink around unstructured packet text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRecord {
    /// The raw packet text, verbatim
    pub water_level: String,

    /// Uplink-local tick (milliseconds since process start) at receipt
    pub received_at: u64,
}

impl FallbackRecord {
    pub fn new(text: impl Into<String>, received_at: u64) -> Self {
        Self {
            water_level: text.into(),
            received_at,
        }
    }
}

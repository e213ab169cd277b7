//! The cache module subscribes to the LoRa/TTN uplink stream and keeps the
//! most recent telemetry per device, readable by UWB node id through the
//! static device mapping.

pub mod lora_cache;
pub mod service;
pub mod ttn;

pub use lora_cache::{CacheStats, LoraTagCache};
pub use service::{LoraCacheConfig, LoraCacheService};

use crate::error::UwbBridgeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 64-bit LoRaWAN device identity, rendered as 16 uppercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevEui(pub u64);

impl fmt::Display for DevEui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl FromStr for DevEui {
    type Err = UwbBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s.trim(), 16)
            .map(DevEui)
            .map_err(|_| UwbBridgeError::InvalidHexId(s.to_string()))
    }
}

impl Serialize for DevEui {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DevEui {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fields lifted out of the uplink's decoded payload.
///
/// Everything is optional; a missing field degrades the record rather than
/// rejecting the message. Keys the bridge does not model are kept verbatim
/// in `extra`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTelemetry {
    pub battery: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub triage: Option<i64>,
    pub fix_type: Option<i64>,
    pub satellites: Option<i64>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A location reported in the uplink, tagged with the key it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoraLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    /// Source tag, preserved verbatim from the uplink.
    pub source: String,
}

/// Uplink metadata: frame counters and the application's device naming.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UplinkMeta {
    pub f_cnt: Option<u32>,
    pub f_port: Option<u8>,
    pub device_id: Option<String>,
    pub application_id: Option<String>,
}

/// Reception report from one gateway.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayObservation {
    pub gateway_id: Option<String>,
    pub gateway_eui: Option<String>,
    pub rssi: Option<f64>,
    pub snr: Option<f64>,
    pub timestamp: Option<u64>,
}

/// One cached uplink, stamped with the wall-clock receive time.
#[derive(Debug, Clone, PartialEq)]
pub struct LoraRecord {
    pub dev_eui: DevEui,
    /// Wall-clock seconds at ingest.
    pub captured_at: f64,
    /// The broker's `received_at` ISO-8601 string, if present.
    pub received_at: Option<String>,
    pub decoded: DecodedTelemetry,
    pub location: Option<LoraLocation>,
    pub meta: UplinkMeta,
    pub gateways: Vec<GatewayObservation>,
}

impl LoraRecord {
    /// The record carries usable GPS coordinates.
    pub fn has_gps(&self) -> bool {
        self.location.is_some()
    }

    /// Best (maximum) RSSI across all gateway observations.
    pub fn best_rssi(&self) -> Option<f64> {
        self.gateways
            .iter()
            .filter_map(|g| g.rssi)
            .fold(None, |best, v| match best {
                Some(b) if b >= v => Some(b),
                _ => Some(v),
            })
    }

    /// Best (maximum) SNR across all gateway observations.
    pub fn best_snr(&self) -> Option<f64> {
        self.gateways
            .iter()
            .filter_map(|g| g.snr)
            .fold(None, |best, v| match best {
                Some(b) if b >= v => Some(b),
                _ => Some(v),
            })
    }
}

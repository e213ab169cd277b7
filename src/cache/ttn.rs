//! # TTN v3 Uplink Extraction
//!
//! Deserialises The Things Network v3 uplink JSON into a [`LoraRecord`].
//! The uplink shape is a tree of optional nested objects; extraction is
//! deliberately lenient. Only `end_device_ids.dev_eui` is mandatory — every
//! other missing field degrades the record instead of failing the message.

use crate::cache::{
    DecodedTelemetry, DevEui, GatewayObservation, LoraLocation, LoraRecord, UplinkMeta,
};
use crate::error::UwbBridgeError;
use serde::Deserialize;
use std::collections::HashMap;

/// Default priority of keys consulted in the uplink's `locations` object.
pub const DEFAULT_LOCATION_PRIORITY: &[&str] = &["frm-payload", "user", "gps"];

#[derive(Debug, Deserialize)]
struct TtnUplink {
    end_device_ids: TtnDeviceIds,
    #[serde(default)]
    uplink_message: Option<TtnUplinkMessage>,
    #[serde(default)]
    received_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TtnDeviceIds {
    dev_eui: String,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    application_ids: Option<TtnApplicationIds>,
}

#[derive(Debug, Deserialize)]
struct TtnApplicationIds {
    #[serde(default)]
    application_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TtnUplinkMessage {
    #[serde(default)]
    f_port: Option<u8>,
    #[serde(default)]
    f_cnt: Option<u32>,
    #[serde(default)]
    decoded_payload: Option<serde_json::Value>,
    #[serde(default)]
    locations: Option<HashMap<String, TtnLocation>>,
    #[serde(default)]
    rx_metadata: Vec<TtnRxMetadata>,
}

#[derive(Debug, Deserialize)]
struct TtnLocation {
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    altitude: Option<f64>,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TtnRxMetadata {
    #[serde(default)]
    gateway_ids: Option<TtnGatewayIds>,
    #[serde(default)]
    rssi: Option<f64>,
    #[serde(default)]
    snr: Option<f64>,
    #[serde(default)]
    timestamp: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TtnGatewayIds {
    #[serde(default)]
    gateway_id: Option<String>,
    #[serde(default)]
    eui: Option<String>,
}

/// Parse one uplink message body into a record stamped `captured_at`.
///
/// `location_priority` is the ordered list of `locations` keys to consult;
/// when none match, the first available entry is used and its key becomes
/// the source tag unless the entry names its own.
pub fn parse_uplink(
    payload: &[u8],
    captured_at: f64,
    location_priority: &[String],
) -> Result<LoraRecord, UwbBridgeError> {
    let msg: TtnUplink = serde_json::from_slice(payload)?;

    let dev_eui: DevEui = msg.end_device_ids.dev_eui.parse()?;
    let uplink = msg.uplink_message.unwrap_or_default();

    let location = uplink
        .locations
        .as_ref()
        .and_then(|locs| select_location(locs, location_priority));

    let decoded = uplink
        .decoded_payload
        .as_ref()
        .map(extract_decoded)
        .unwrap_or_default();

    let gateways = uplink
        .rx_metadata
        .into_iter()
        .map(|rx| GatewayObservation {
            gateway_id: rx.gateway_ids.as_ref().and_then(|g| g.gateway_id.clone()),
            gateway_eui: rx.gateway_ids.as_ref().and_then(|g| g.eui.clone()),
            rssi: rx.rssi,
            snr: rx.snr,
            timestamp: rx.timestamp,
        })
        .collect();

    Ok(LoraRecord {
        dev_eui,
        captured_at,
        received_at: msg.received_at,
        decoded,
        location,
        meta: UplinkMeta {
            f_cnt: uplink.f_cnt,
            f_port: uplink.f_port,
            device_id: msg.end_device_ids.device_id,
            application_id: msg
                .end_device_ids
                .application_ids
                .and_then(|a| a.application_id),
        },
        gateways,
    })
}

/// Pick a location from the `locations` object by key priority, falling back
/// to any first available entry. Entries without both coordinates are
/// unusable and skipped.
fn select_location(
    locations: &HashMap<String, TtnLocation>,
    priority: &[String],
) -> Option<LoraLocation> {
    for key in priority {
        if let Some(loc) = locations.get(key) {
            if let Some(usable) = to_location(loc, key) {
                return Some(usable);
            }
        }
    }
    // Sorted fallback keeps "first available" deterministic.
    let mut keys: Vec<&String> = locations.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(usable) = locations.get(key).and_then(|loc| to_location(loc, key)) {
            return Some(usable);
        }
    }
    None
}

fn to_location(loc: &TtnLocation, key: &str) -> Option<LoraLocation> {
    match (loc.latitude, loc.longitude) {
        (Some(latitude), Some(longitude)) => Some(LoraLocation {
            latitude,
            longitude,
            altitude: loc.altitude,
            accuracy: loc.accuracy,
            source: loc.source.clone().unwrap_or_else(|| key.to_string()),
        }),
        _ => None,
    }
}

fn extract_decoded(value: &serde_json::Value) -> DecodedTelemetry {
    let mut decoded = DecodedTelemetry::default();
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return decoded,
    };

    for (key, v) in obj {
        match key.as_str() {
            "battery" => decoded.battery = v.as_f64(),
            "temperature" => decoded.temperature = v.as_f64(),
            "humidity" => decoded.humidity = v.as_f64(),
            "triage" | "triageStatus" => {
                if decoded.triage.is_none() {
                    decoded.triage = v.as_i64();
                }
            }
            "fix_type" => decoded.fix_type = v.as_i64(),
            "satellites" => decoded.satellites = v.as_i64(),
            _ => {
                decoded.extra.insert(key.clone(), v.clone());
            }
        }
    }
    decoded
}

/// The default location priority as owned strings, for configs.
pub fn default_location_priority() -> Vec<String> {
    DEFAULT_LOCATION_PRIORITY
        .iter()
        .map(|s| s.to_string())
        .collect()
}

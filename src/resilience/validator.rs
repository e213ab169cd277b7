//! # Data Validator
//!
//! Range checks over everything the bridge publishes: TWR distances, GPS
//! coordinates, battery level and temperature. Rejected edges are excluded
//! from the materialised network and batched into a validation-failures
//! document; rejected telemetry is warned about and counted.

use crate::cache::LoraRecord;
use crate::constants::MAX_DISTANCE_METERS;
use crate::uwb::{Edge, NodeId};
use serde::Serialize;
use std::sync::Mutex;

/// Result of a single validation check.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub reason: Option<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        ValidationResult {
            is_valid: true,
            reason: None,
        }
    }

    fn rejected(reason: String) -> Self {
        ValidationResult {
            is_valid: false,
            reason: Some(reason),
        }
    }
}

/// One rejected datum, as published to the validation-failures topic.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationFailure {
    #[serde(rename = "type")]
    pub kind: String,
    /// The offending edge verbatim: [end0, end1, distance].
    pub edge: (NodeId, NodeId, f64),
    pub reason: String,
    pub timestamp: f64,
}

/// Counters per rejection class.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ValidationStats {
    pub total_validated: u64,
    pub distance_rejected: u64,
    pub gps_rejected: u64,
    pub battery_rejected: u64,
    pub temperature_rejected: u64,
}

impl ValidationStats {
    pub fn total_rejected(&self) -> u64 {
        self.distance_rejected + self.gps_rejected + self.battery_rejected
            + self.temperature_rejected
    }
}

/// Configurable validation bounds.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub min_distance_meters: f64,
    pub max_distance_meters: f64,
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
    pub min_battery_percent: f64,
    pub max_battery_percent: f64,
    pub min_temperature_celsius: f64,
    pub max_temperature_celsius: f64,
    /// Reject GPS fixes at exactly (0, 0).
    pub reject_zero_gps: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            min_distance_meters: 0.0,
            max_distance_meters: MAX_DISTANCE_METERS,
            min_latitude: -90.0,
            max_latitude: 90.0,
            min_longitude: -180.0,
            max_longitude: 180.0,
            min_battery_percent: 0.0,
            max_battery_percent: 100.0,
            min_temperature_celsius: -40.0,
            max_temperature_celsius: 85.0,
            reject_zero_gps: true,
        }
    }
}

/// Validates UWB and LoRa data for sanity and correctness.
#[derive(Debug)]
pub struct DataValidator {
    config: ValidatorConfig,
    stats: Mutex<ValidationStats>,
}

impl DataValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        DataValidator {
            config,
            stats: Mutex::new(ValidationStats::default()),
        }
    }

    /// Validate one distance measurement.
    pub fn validate_distance(
        &self,
        distance_meters: f64,
        node1: Option<NodeId>,
        node2: Option<NodeId>,
    ) -> ValidationResult {
        let mut stats = self.stats.lock().unwrap();
        stats.total_validated += 1;

        let bound_violation = if distance_meters < self.config.min_distance_meters {
            Some(format!(
                "Distance {distance_meters:.3}m below minimum {}m",
                self.config.min_distance_meters
            ))
        } else if distance_meters > self.config.max_distance_meters {
            Some(format!(
                "Distance {distance_meters:.3}m exceeds maximum {}m",
                self.config.max_distance_meters
            ))
        } else {
            None
        };

        match bound_violation {
            Some(mut reason) => {
                if let (Some(a), Some(b)) = (node1, node2) {
                    reason.push_str(&format!(" (nodes: {a} -> {b})"));
                }
                stats.distance_rejected += 1;
                ValidationResult::rejected(reason)
            }
            None => ValidationResult::ok(),
        }
    }

    /// Validate GPS coordinates. Altitude is carried but not range-checked.
    pub fn validate_gps_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
        _altitude: Option<f64>,
        node: Option<NodeId>,
    ) -> ValidationResult {
        let suffix = node.map(|n| format!(" (UWB id: {n})")).unwrap_or_default();

        if self.config.reject_zero_gps && latitude == 0.0 && longitude == 0.0 {
            self.stats.lock().unwrap().gps_rejected += 1;
            return ValidationResult::rejected(format!(
                "GPS coordinates are 0,0 (invalid){suffix}"
            ));
        }
        if latitude < self.config.min_latitude || latitude > self.config.max_latitude {
            self.stats.lock().unwrap().gps_rejected += 1;
            return ValidationResult::rejected(format!(
                "Latitude {latitude:.6} outside valid range [{}, {}]{suffix}",
                self.config.min_latitude, self.config.max_latitude
            ));
        }
        if longitude < self.config.min_longitude || longitude > self.config.max_longitude {
            self.stats.lock().unwrap().gps_rejected += 1;
            return ValidationResult::rejected(format!(
                "Longitude {longitude:.6} outside valid range [{}, {}]{suffix}",
                self.config.min_longitude, self.config.max_longitude
            ));
        }
        ValidationResult::ok()
    }

    /// Validate a battery level in percent.
    pub fn validate_battery_level(
        &self,
        battery_percent: f64,
        node: Option<NodeId>,
    ) -> ValidationResult {
        if battery_percent < self.config.min_battery_percent
            || battery_percent > self.config.max_battery_percent
        {
            let suffix = node.map(|n| format!(" (UWB id: {n})")).unwrap_or_default();
            self.stats.lock().unwrap().battery_rejected += 1;
            return ValidationResult::rejected(format!(
                "Battery level {battery_percent:.1}% outside valid range [{}, {}]{suffix}",
                self.config.min_battery_percent, self.config.max_battery_percent
            ));
        }
        ValidationResult::ok()
    }

    /// Validate a temperature in Celsius.
    pub fn validate_temperature(
        &self,
        temperature_celsius: f64,
        node: Option<NodeId>,
    ) -> ValidationResult {
        if temperature_celsius < self.config.min_temperature_celsius
            || temperature_celsius > self.config.max_temperature_celsius
        {
            let suffix = node.map(|n| format!(" (UWB id: {n})")).unwrap_or_default();
            self.stats.lock().unwrap().temperature_rejected += 1;
            return ValidationResult::rejected(format!(
                "Temperature {temperature_celsius:.1}C outside valid range [{}, {}]{suffix}",
                self.config.min_temperature_celsius, self.config.max_temperature_celsius
            ));
        }
        ValidationResult::ok()
    }

    /// Split an edge list into the edges that pass the distance bounds and
    /// failure documents for the rest.
    pub fn validate_edge_list(
        &self,
        edges: &[Edge],
        now: f64,
    ) -> (Vec<Edge>, Vec<ValidationFailure>) {
        let mut valid = Vec::with_capacity(edges.len());
        let mut failures = Vec::new();

        for edge in edges {
            let result =
                self.validate_distance(edge.distance_m as f64, Some(edge.a), Some(edge.b));
            if result.is_valid {
                valid.push(*edge);
            } else {
                failures.push(ValidationFailure {
                    kind: "distance".to_string(),
                    edge: (edge.a, edge.b, edge.distance_m as f64),
                    reason: result.reason.unwrap_or_else(|| "rejected".to_string()),
                    timestamp: now,
                });
            }
        }
        (valid, failures)
    }

    /// Validate the telemetry of one cached record. Failures are returned as
    /// reasons; the caller decides whether to warn or drop.
    pub fn validate_lora_data(
        &self,
        record: &LoraRecord,
        node: Option<NodeId>,
    ) -> (bool, Vec<String>) {
        let mut failures = Vec::new();

        if let Some(loc) = &record.location {
            let result =
                self.validate_gps_coordinates(loc.latitude, loc.longitude, loc.altitude, node);
            if let Some(reason) = result.reason {
                failures.push(reason);
            }
        }
        if let Some(battery) = record.decoded.battery {
            let result = self.validate_battery_level(battery, node);
            if let Some(reason) = result.reason {
                failures.push(reason);
            }
        }
        if let Some(temperature) = record.decoded.temperature {
            let result = self.validate_temperature(temperature, node);
            if let Some(reason) = result.reason {
                failures.push(reason);
            }
        }

        (failures.is_empty(), failures)
    }

    pub fn stats(&self) -> ValidationStats {
        *self.stats.lock().unwrap()
    }
}

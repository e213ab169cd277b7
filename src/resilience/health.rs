//! # Health Monitor
//!
//! Tracks operational metrics across every component and classifies the
//! bridge as healthy, degraded or unhealthy. The current health document is
//! published periodically to the health topic and always written to a
//! well-known local path for container liveness probes.

use crate::constants::{
    DEFAULT_HEALTH_REPORT_INTERVAL, DEFAULT_MQTT_TIMEOUT_SECONDS, DEFAULT_STARTUP_GRACE_SECONDS,
    DEFAULT_UWB_DATA_TIMEOUT_SECONDS, HEALTH_FILE_NAME,
};
use crate::error::UwbBridgeError;
use crate::util::unix_time;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;

/// Top-level health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Classification thresholds and reporting cadence.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub report_interval_seconds: f64,
    pub mqtt_timeout_seconds: f64,
    pub startup_grace_seconds: f64,
    pub uwb_data_timeout_seconds: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            report_interval_seconds: DEFAULT_HEALTH_REPORT_INTERVAL,
            mqtt_timeout_seconds: DEFAULT_MQTT_TIMEOUT_SECONDS,
            startup_grace_seconds: DEFAULT_STARTUP_GRACE_SECONDS,
            uwb_data_timeout_seconds: DEFAULT_UWB_DATA_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug)]
struct HealthInner {
    start_time: f64,
    parsing_errors: u64,
    connection_errors: u64,
    consecutive_errors: u64,
    device_resets: u64,
    last_reset_time: Option<f64>,
    last_error_time: Option<f64>,
    successful_packets: u64,
    failed_packets: u64,
    mqtt_publishes: u64,
    mqtt_failures: u64,
    serial_connected: bool,
    mqtt_connected: bool,
    lora_cache_connected: bool,
    last_uwb_data_time: Option<f64>,
    last_mqtt_connected_time: Option<f64>,
    last_report_time: f64,
}

/// Connection flags in the health document.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConnectionsDoc {
    pub serial: bool,
    pub mqtt: bool,
    pub lora_cache: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PacketMetricsDoc {
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMetricsDoc {
    pub parsing: u64,
    pub connection: u64,
    pub consecutive: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceMetricsDoc {
    pub resets: u64,
    pub last_reset: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MqttMetricsDoc {
    pub publishes: u64,
    pub failures: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsDoc {
    pub packets: PacketMetricsDoc,
    pub errors: ErrorMetricsDoc,
    pub device: DeviceMetricsDoc,
    pub mqtt: MqttMetricsDoc,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_since_last_uwb_data: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_since_last_mqtt_connection: Option<f64>,
}

/// The health document as published and written to the health file.
#[derive(Debug, Clone, Serialize)]
pub struct HealthDocument {
    pub status: HealthState,
    pub timestamp: String,
    pub uptime_seconds: f64,
    pub connections: ConnectionsDoc,
    pub metrics: MetricsDoc,
}

/// Monitors and reports system health metrics.
///
/// All recording methods take `&self`; the monitor is shared across the main
/// loop and the MQTT tasks behind an `Arc`.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    inner: Mutex<HealthInner>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self::new_at(config, unix_time())
    }

    pub fn new_at(config: HealthConfig, now: f64) -> Self {
        HealthMonitor {
            config,
            inner: Mutex::new(HealthInner {
                start_time: now,
                parsing_errors: 0,
                connection_errors: 0,
                consecutive_errors: 0,
                device_resets: 0,
                last_reset_time: None,
                last_error_time: None,
                successful_packets: 0,
                failed_packets: 0,
                mqtt_publishes: 0,
                mqtt_failures: 0,
                serial_connected: false,
                mqtt_connected: false,
                lora_cache_connected: false,
                last_uwb_data_time: None,
                last_mqtt_connected_time: None,
                last_report_time: 0.0,
            }),
        }
    }

    pub fn record_parsing_error(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = unix_time();
        inner.parsing_errors += 1;
        inner.failed_packets += 1;
        inner.consecutive_errors += 1;
        inner.last_error_time = Some(now);
    }

    pub fn record_connection_error(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.connection_errors += 1;
        inner.consecutive_errors += 1;
        inner.last_error_time = Some(unix_time());
    }

    pub fn record_device_reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.device_resets += 1;
        inner.consecutive_errors = 0;
        inner.last_reset_time = Some(unix_time());
    }

    /// Record a successfully processed packet; also marks fresh UWB data.
    pub fn record_successful_packet(&self) {
        self.record_successful_packet_at(unix_time());
    }

    pub fn record_successful_packet_at(&self, now: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.successful_packets += 1;
        inner.consecutive_errors = 0;
        inner.last_uwb_data_time = Some(now);
    }

    pub fn record_mqtt_publish(&self, success: bool) {
        let mut inner = self.inner.lock().unwrap();
        if success {
            inner.mqtt_publishes += 1;
        } else {
            inner.mqtt_failures += 1;
        }
    }

    pub fn set_serial_connected(&self, connected: bool) {
        self.inner.lock().unwrap().serial_connected = connected;
    }

    pub fn set_mqtt_connected(&self, connected: bool) {
        self.set_mqtt_connected_at(connected, unix_time());
    }

    pub fn set_mqtt_connected_at(&self, connected: bool, now: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.mqtt_connected = connected;
        if connected {
            inner.last_mqtt_connected_time = Some(now);
        }
    }

    pub fn set_lora_cache_connected(&self, connected: bool) {
        self.inner.lock().unwrap().lora_cache_connected = connected;
    }

    pub fn mqtt_connected(&self) -> bool {
        self.inner.lock().unwrap().mqtt_connected
    }

    /// Classify and build the health document at the current wall clock.
    pub fn document(&self) -> HealthDocument {
        self.document_at(unix_time())
    }

    /// Classify and build the health document at `now`.
    pub fn document_at(&self, now: f64) -> HealthDocument {
        let inner = self.inner.lock().unwrap();

        let total_packets = inner.successful_packets + inner.failed_packets;
        let success_rate = if total_packets > 0 {
            inner.successful_packets as f64 / total_packets as f64
        } else {
            1.0
        };
        let total_mqtt = inner.mqtt_publishes + inner.mqtt_failures;
        let mqtt_success_rate = if total_mqtt > 0 {
            inner.mqtt_publishes as f64 / total_mqtt as f64
        } else {
            1.0
        };

        let uptime = now - inner.start_time;
        let since_uwb = inner.last_uwb_data_time.map(|t| now - t);
        let since_mqtt = inner.last_mqtt_connected_time.map(|t| now - t);

        let mqtt_down_too_long = !inner.mqtt_connected
            && uptime > self.config.startup_grace_seconds
            && (now - inner.last_mqtt_connected_time.unwrap_or(inner.start_time))
                > self.config.mqtt_timeout_seconds;
        let uwb_silent = (now - inner.last_uwb_data_time.unwrap_or(inner.start_time))
            > self.config.uwb_data_timeout_seconds;

        let status = if mqtt_down_too_long
            || uwb_silent
            || inner.consecutive_errors >= 5
            || inner.parsing_errors >= 10
            || (inner.parsing_errors > 0 && success_rate < 0.8)
        {
            HealthState::Unhealthy
        } else if !inner.serial_connected || success_rate < 0.8 {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        HealthDocument {
            status,
            timestamp: iso_timestamp(now),
            uptime_seconds: uptime,
            connections: ConnectionsDoc {
                serial: inner.serial_connected,
                mqtt: inner.mqtt_connected,
                lora_cache: inner.lora_cache_connected,
            },
            metrics: MetricsDoc {
                packets: PacketMetricsDoc {
                    successful: inner.successful_packets,
                    failed: inner.failed_packets,
                    success_rate: (success_rate * 1000.0).round() / 1000.0,
                },
                errors: ErrorMetricsDoc {
                    parsing: inner.parsing_errors,
                    connection: inner.connection_errors,
                    consecutive: inner.consecutive_errors,
                },
                device: DeviceMetricsDoc {
                    resets: inner.device_resets,
                    last_reset: inner.last_reset_time,
                },
                mqtt: MqttMetricsDoc {
                    publishes: inner.mqtt_publishes,
                    failures: inner.mqtt_failures,
                    success_rate: (mqtt_success_rate * 1000.0).round() / 1000.0,
                },
                seconds_since_last_uwb_data: since_uwb,
                seconds_since_last_mqtt_connection: since_mqtt,
            },
        }
    }

    /// A report is due when the configured interval has passed.
    pub fn report_due(&self) -> bool {
        self.report_due_at(unix_time())
    }

    pub fn report_due_at(&self, now: f64) -> bool {
        let inner = self.inner.lock().unwrap();
        now - inner.last_report_time >= self.config.report_interval_seconds
    }

    pub fn mark_reported(&self) {
        self.mark_reported_at(unix_time());
    }

    pub fn mark_reported_at(&self, now: f64) {
        self.inner.lock().unwrap().last_report_time = now;
    }

    /// Path of the local health file read by liveness probes.
    pub fn health_file_path() -> PathBuf {
        std::env::temp_dir().join(HEALTH_FILE_NAME)
    }

    /// Write the document to the local health file.
    pub fn write_health_file(document: &HealthDocument) -> Result<(), UwbBridgeError> {
        let json = serde_json::to_string(document)?;
        std::fs::write(Self::health_file_path(), json)?;
        Ok(())
    }
}

fn iso_timestamp(now: f64) -> String {
    let secs = now.floor() as i64;
    let nanos = ((now - now.floor()) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .unwrap_or_default()
}

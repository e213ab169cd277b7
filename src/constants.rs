//! UWB Bridge Constants
//!
//! This module defines constants used across the bridge: the framed serial
//! protocol, TWR conversion, cache TTLs and the error-recovery defaults.

/// TWR (time-of-flight) conversion factor: distance_m = twr_value * TWR_TO_METERS
pub const TWR_TO_METERS: f64 = 0.004690384;

/// Maximum valid distance in metres (TWR value validation)
pub const MAX_DISTANCE_METERS: f64 = 300.0;

/// Two-byte magic prefix of every framed packet
pub const PACKET_MAGIC: [u8; 2] = [0xDC, 0xAC];

/// Assignment packet (act_type = 2)
pub const PACKET_TYPE_ASSIGNMENT: u8 = 2;

/// Distance measurement packet (act_type = 4)
pub const PACKET_TYPE_DISTANCE: u8 = 4;

/// Mode bit 0: group 1 internal measurements
pub const MODE_GROUP1_INTERNAL: u8 = 1;

/// Mode bit 1: group 2 internal measurements
pub const MODE_GROUP2_INTERNAL: u8 = 2;

/// Maximum parsing errors before a device reset is requested
pub const MAX_PARSING_ERRORS: u32 = 3;

/// Connection errors before a device reset is requested
pub const DEFAULT_CONNECTION_ERROR_THRESHOLD: u32 = 3;

/// Initial reset backoff delay in seconds
pub const DEFAULT_INITIAL_BACKOFF_SECONDS: f64 = 1.0;

/// Maximum reset backoff delay in seconds
pub const DEFAULT_MAX_BACKOFF_SECONDS: f64 = 60.0;

/// Exponential backoff multiplier
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Interval between health reports in seconds
pub const DEFAULT_HEALTH_REPORT_INTERVAL: f64 = 60.0;

/// MQTT disconnection tolerated before the bridge is unhealthy, in seconds
pub const DEFAULT_MQTT_TIMEOUT_SECONDS: f64 = 60.0;

/// Grace period after startup before MQTT disconnection counts, in seconds
pub const DEFAULT_STARTUP_GRACE_SECONDS: f64 = 30.0;

/// Silence on the UWB serial line tolerated before unhealthy, in seconds
pub const DEFAULT_UWB_DATA_TIMEOUT_SECONDS: f64 = 300.0;

/// Time-to-live for cached records carrying GPS coordinates, in seconds
pub const DEFAULT_GPS_TTL_SECONDS: f64 = 300.0;

/// Time-to-live for cached sensor-only records, in seconds
pub const DEFAULT_SENSOR_TTL_SECONDS: f64 = 600.0;

/// Cache eviction sweep period in seconds
pub const DEFAULT_CLEANUP_INTERVAL_SECONDS: f64 = 60.0;

/// Minimum seconds between outbound publishes on the main topic
pub const DEFAULT_RATE_LIMIT_SECONDS: f64 = 10.0;

/// UWB serial line baud rate (8N1, no flow control)
pub const SERIAL_BAUD_RATE: u32 = 115200;

/// DTR held high for at least this long to reset the device, in milliseconds
pub const RESET_PULSE_MILLIS: u64 = 100;

/// File name of the local health document, under the platform temp directory
pub const HEALTH_FILE_NAME: &str = "uwb-health-status.json";

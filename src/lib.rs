//! # uwb-bridge-rs - UWB/LoRa Telemetry Bridge
//!
//! The uwb-bridge-rs crate fuses two asynchronous telemetry streams into a
//! single enriched positioning feed: a framed binary stream from an
//! Ultra-Wideband (UWB) two-way-ranging device on a serial line, and a
//! JSON uplink stream from a LoRa/TTN broker over TLS MQTT.
//!
//! ## Features
//!
//! - Resynchronising packet framer and stateful TWR parser for the UWB
//!   serial protocol
//! - TTL cache correlating LoRa telemetry (battery, temperature, triage,
//!   GPS) with UWB identities through a static device mapping
//! - Network materialiser merging anchors, ranging edges and cached
//!   telemetry into the published network document
//! - Error-budget accounting with exponential backoff around the device
//!   reset, range validation and periodic health reporting
//! - Rate-limited outbound MQTT publishing with a live command topic
//!
//! ## Usage
//!
//! ```no_run
//! use uwb_bridge_rs::bridge::{self, BridgeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), uwb_bridge_rs::UwbBridgeError> {
//!     let config = BridgeConfig {
//!         uart: "/dev/ttyUSB0".to_string(),
//!         ..BridgeConfig::default()
//!     };
//!     bridge::run(config).await
//! }
//! ```

pub mod bridge;
pub mod cache;
pub mod constants;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod network;
pub mod resilience;
pub mod util;
pub mod uwb;

pub use crate::error::UwbBridgeError;
pub use crate::logging::{init_logger, log_info};

// Core UWB types
pub use uwb::{Assignment, Edge, FrameBuffer, NodeId, PacketEvent, TwrParser, UwbSerialHandle};

// Cache and mapping
pub use cache::{DevEui, LoraRecord, LoraTagCache};
pub use network::{AnchorMap, DevEuiMap};

// Materialised documents
pub use network::{Network, NetworkBuilder, NetworkConfig, UwbNode};

// Resilience layer
pub use resilience::{
    DataValidator, ErrorRecovery, ErrorType, HealthMonitor, HealthState, RecoveryConfig,
    ValidatorConfig,
};

// Outbound publishing
pub use mqtt::{MqttPublisherConfig, RateLimit, UwbMqttPublisher};

pub use bridge::BridgeConfig;

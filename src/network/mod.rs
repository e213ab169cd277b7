//! The network module materialises edge lists into the enriched network
//! document published downstream, using the static anchor map and the LoRa
//! telemetry cache.

pub mod builder;
pub mod confidence;
pub mod config;

pub use builder::{
    AnchorTimestamp, GpsDiagnostics, Network, NetworkBuilder, NetworkConfig, NetworkEdge, Position,
    UwbNode,
};
pub use confidence::ConfidenceScorer;
pub use config::{AnchorMap, DevEuiMap};

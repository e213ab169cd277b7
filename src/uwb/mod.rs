//! The uwb module contains the components that talk to the ranging device:
//! the serial port handle, the packet framer and the stateful TWR parser.

pub mod frame;
pub mod parser;
pub mod serial;

pub use frame::FrameBuffer;
pub use parser::{Assignment, PacketEvent, TwrParser};
pub use serial::UwbSerialHandle;

use crate::error::UwbBridgeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 16-bit UWB node identifier, rendered externally as 4 uppercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u16);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = UwbBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u16::from_str_radix(s.trim(), 16)
            .map(NodeId)
            .map_err(|_| UwbBridgeError::InvalidHexId(s.to_string()))
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single two-way-ranging measurement between two nodes.
///
/// The pair is unordered in meaning; the order is as produced by the parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub a: NodeId,
    pub b: NodeId,
    /// Distance in metres, already range-gated to (0, 300).
    pub distance_m: f32,
}

impl Edge {
    pub fn new(a: NodeId, b: NodeId, distance_m: f32) -> Self {
        Edge { a, b, distance_m }
    }
}

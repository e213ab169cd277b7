//! # Bridge Error Handling
//!
//! This module defines the UwbBridgeError enum, which represents the different
//! error types that can occur in the uwb-bridge-rs crate.

use thiserror::Error;

/// Represents the different error types that can occur in the bridge.
#[derive(Debug, Error)]
pub enum UwbBridgeError {
    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// Indicates an error when parsing a framed UWB packet.
    #[error("Error parsing UWB packet: {0}")]
    PacketParseError(String),

    /// Indicates a configuration file could not be loaded or understood.
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Indicates an invalid hexadecimal identifier string was provided.
    #[error("Invalid hexadecimal id: {0}")]
    InvalidHexId(String),

    /// Indicates a TLS connector could not be built.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Indicates a JSON document could not be parsed or serialised.
    #[error("JSON error: {0}")]
    JsonError(String),

    /// A catch-all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for UwbBridgeError {
    fn from(e: serde_json::Error) -> Self {
        UwbBridgeError::JsonError(e.to_string())
    }
}

impl From<std::io::Error> for UwbBridgeError {
    fn from(e: std::io::Error) -> Self {
        UwbBridgeError::Other(e.to_string())
    }
}

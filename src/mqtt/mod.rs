//! The mqtt module owns the outbound broker session: the rate-limited
//! network publisher, the command subscription that retunes the rate limit
//! live, and the TLS transport shared with the LoRa cache's client.

pub mod publisher;
pub mod rate_limit;

pub use publisher::{MqttPublisherConfig, UwbMqttPublisher};
pub use rate_limit::RateLimit;

use crate::error::UwbBridgeError;
use rumqttc::{TlsConfiguration, Transport};

/// TLS transport with certificate verification disabled.
///
/// Operational requirement: both brokers sit behind self-signed chains in
/// the field deployments this bridge targets, so hostname and chain checks
/// are switched off. Transport encryption is still TLS.
pub fn insecure_tls_transport() -> Result<Transport, UwbBridgeError> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| UwbBridgeError::TlsError(e.to_string()))?;
    Ok(Transport::tls_with_config(
        TlsConfiguration::NativeConnector(connector.into()),
    ))
}

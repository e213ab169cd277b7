//! Utility modules shared across the bridge.

pub mod framebuf;

pub use framebuf::StreamBuffer;

/// Wall-clock seconds since the Unix epoch.
///
/// The cache, the recovery layer and the materialiser all reason about ages
/// in fractional seconds, so the bridge keeps a single definition of "now".
pub fn unix_time() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

//! # Publish Rate Limiting
//!
//! A monotonic minimum interval between outbound publishes on the main
//! topic. Attempts inside the window are skipped, not queued. The interval
//! sits behind a mutex so the command subscription can replace it while the
//! publisher keeps reading it.

use crate::constants::DEFAULT_RATE_LIMIT_SECONDS;
use log::info;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct RateLimitInner {
    interval: Duration,
    last_publish: Option<Instant>,
}

/// Live-tunable minimum inter-publish interval.
#[derive(Debug)]
pub struct RateLimit {
    inner: Mutex<RateLimitInner>,
}

impl RateLimit {
    pub fn new(interval_seconds: f64) -> Self {
        RateLimit {
            inner: Mutex::new(RateLimitInner {
                interval: Duration::from_secs_f64(interval_seconds.max(0.0)),
                last_publish: None,
            }),
        }
    }

    /// Check whether a publish may go out now, and if so record it.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Check against an explicit clock (tests).
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.last_publish {
            Some(last) if now.duration_since(last) < inner.interval => false,
            _ => {
                inner.last_publish = Some(now);
                true
            }
        }
    }

    /// Replace the interval; takes effect immediately.
    pub fn set_interval_seconds(&self, seconds: f64) {
        let mut inner = self.inner.lock().unwrap();
        let old = inner.interval.as_secs_f64();
        inner.interval = Duration::from_secs_f64(seconds.max(0.0));
        info!("Updated rate limit: {old}s -> {seconds}s");
    }

    pub fn interval_seconds(&self) -> f64 {
        self.inner.lock().unwrap().interval.as_secs_f64()
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit::new(DEFAULT_RATE_LIMIT_SECONDS)
    }
}

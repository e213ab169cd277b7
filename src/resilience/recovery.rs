//! # Error Recovery
//!
//! Per-class error accounting with exponential backoff around the device
//! reset. Each error class has its own counter and threshold; reaching a
//! threshold requests a reset, but resets themselves are gated so a storm of
//! errors cannot pulse the DTR line in a loop. The first reset happens
//! immediately; each subsequent one waits `initial * multiplier^resets`
//! seconds (clamped to a maximum) since the last.

use crate::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_CONNECTION_ERROR_THRESHOLD,
    DEFAULT_INITIAL_BACKOFF_SECONDS, DEFAULT_MAX_BACKOFF_SECONDS, MAX_PARSING_ERRORS,
};
use crate::util::unix_time;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;

/// Classes of errors tracked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Parsing,
    Connection,
    Serial,
    Mqtt,
}

impl ErrorType {
    pub const ALL: [ErrorType; 4] = [
        ErrorType::Parsing,
        ErrorType::Connection,
        ErrorType::Serial,
        ErrorType::Mqtt,
    ];
}

/// Thresholds and backoff parameters.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub parsing_error_threshold: u32,
    pub connection_error_threshold: u32,
    pub serial_error_threshold: u32,
    pub mqtt_error_threshold: u32,
    pub initial_backoff_seconds: f64,
    pub max_backoff_seconds: f64,
    pub backoff_multiplier: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            parsing_error_threshold: MAX_PARSING_ERRORS,
            connection_error_threshold: DEFAULT_CONNECTION_ERROR_THRESHOLD,
            serial_error_threshold: DEFAULT_CONNECTION_ERROR_THRESHOLD,
            mqtt_error_threshold: DEFAULT_CONNECTION_ERROR_THRESHOLD,
            initial_backoff_seconds: DEFAULT_INITIAL_BACKOFF_SECONDS,
            max_backoff_seconds: DEFAULT_MAX_BACKOFF_SECONDS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// Error recovery statistics, serialised for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStats {
    pub error_counts: HashMap<ErrorType, u32>,
    pub reset_count: u32,
    pub last_reset_time: Option<f64>,
    pub current_backoff_seconds: f64,
}

/// Manages error recovery with per-class thresholds and exponential backoff.
#[derive(Debug)]
pub struct ErrorRecovery {
    config: RecoveryConfig,
    error_counts: HashMap<ErrorType, u32>,
    reset_count: u32,
    last_reset_time: Option<f64>,
}

impl ErrorRecovery {
    pub fn new(config: RecoveryConfig) -> Self {
        let error_counts = ErrorType::ALL.iter().map(|&t| (t, 0)).collect();
        ErrorRecovery {
            config,
            error_counts,
            reset_count: 0,
            last_reset_time: None,
        }
    }

    fn threshold(&self, error_type: ErrorType) -> u32 {
        match error_type {
            ErrorType::Parsing => self.config.parsing_error_threshold,
            ErrorType::Connection => self.config.connection_error_threshold,
            ErrorType::Serial => self.config.serial_error_threshold,
            ErrorType::Mqtt => self.config.mqtt_error_threshold,
        }
    }

    /// Record an error. Returns true when the class threshold has been
    /// reached and a reset is required.
    pub fn record_error(&mut self, error_type: ErrorType) -> bool {
        let count = self.error_counts.entry(error_type).or_insert(0);
        *count += 1;
        let count = *count;
        let threshold = self.threshold(error_type);
        if count >= threshold {
            warn!(
                "{error_type:?} error threshold reached ({count}/{threshold}), reset required"
            );
            true
        } else {
            false
        }
    }

    /// Backoff window currently in effect, in seconds.
    ///
    /// The first reset is free; after it the window starts at the initial
    /// backoff and multiplies with every further reset.
    pub fn current_backoff_seconds(&self) -> f64 {
        let exponent = self.reset_count.saturating_sub(1);
        (self.config.initial_backoff_seconds
            * self.config.backoff_multiplier.powi(exponent as i32))
        .min(self.config.max_backoff_seconds)
    }

    /// Check whether a reset may be performed at `now`, honouring backoff.
    pub fn should_reset_with_backoff_at(&self, now: f64) -> bool {
        let last = match self.last_reset_time {
            Some(t) => t,
            None => return true,
        };
        let backoff = self.current_backoff_seconds();
        let elapsed = now - last;
        if elapsed < backoff {
            debug!(
                "Backoff active: {:.1}s remaining (backoff: {backoff:.1}s, reset count: {})",
                backoff - elapsed,
                self.reset_count
            );
            false
        } else {
            true
        }
    }

    /// Check against the current wall clock.
    pub fn should_reset_with_backoff(&self) -> bool {
        self.should_reset_with_backoff_at(unix_time())
    }

    /// Record that a reset was performed at `now`.
    pub fn record_reset_at(&mut self, now: f64) {
        self.reset_count += 1;
        self.last_reset_time = Some(now);
        info!(
            "Device reset #{} performed (next backoff: {:.1}s)",
            self.reset_count,
            self.current_backoff_seconds()
        );
    }

    /// Record a reset against the current wall clock.
    pub fn record_reset(&mut self) {
        self.record_reset_at(unix_time());
    }

    /// Clear one class's counter, or every counter when `None`.
    pub fn reset_error_counts(&mut self, error_type: Option<ErrorType>) {
        match error_type {
            Some(t) => {
                self.error_counts.insert(t, 0);
            }
            None => {
                for t in ErrorType::ALL {
                    self.error_counts.insert(t, 0);
                }
            }
        }
    }

    pub fn error_count(&self, error_type: ErrorType) -> u32 {
        self.error_counts.get(&error_type).copied().unwrap_or(0)
    }

    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }

    pub fn last_reset_time(&self) -> Option<f64> {
        self.last_reset_time
    }

    pub fn stats(&self) -> RecoveryStats {
        RecoveryStats {
            error_counts: self.error_counts.clone(),
            reset_count: self.reset_count,
            last_reset_time: self.last_reset_time,
            current_backoff_seconds: self.current_backoff_seconds(),
        }
    }
}

//! The resilience module keeps the bridge alive through bad data and flaky
//! links: per-class error recovery with backoff around the device reset,
//! range validation of everything published, and health classification and
//! reporting.

pub mod health;
pub mod recovery;
pub mod validator;

pub use health::{HealthConfig, HealthDocument, HealthMonitor, HealthState};
pub use recovery::{ErrorRecovery, ErrorType, RecoveryConfig, RecoveryStats};
pub use validator::{DataValidator, ValidationFailure, ValidationResult, ValidatorConfig};

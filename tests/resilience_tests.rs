//! Integration tests for the resilience layer: error-budget accounting,
//! exponential backoff and health classification.

use uwb_bridge_rs::resilience::{
    ErrorRecovery, ErrorType, HealthConfig, HealthMonitor, HealthState, RecoveryConfig,
};

#[test]
fn test_reset_request_at_threshold() {
    let mut recovery = ErrorRecovery::new(RecoveryConfig::default());
    assert!(!recovery.record_error(ErrorType::Parsing));
    assert!(!recovery.record_error(ErrorType::Parsing));
    assert!(recovery.record_error(ErrorType::Parsing));
    // The counter stays at threshold until explicitly cleared, so further
    // errors keep requesting a reset.
    assert!(recovery.record_error(ErrorType::Parsing));
}

#[test]
fn test_per_class_thresholds() {
    let config = RecoveryConfig {
        parsing_error_threshold: 2,
        connection_error_threshold: 5,
        ..RecoveryConfig::default()
    };
    let mut recovery = ErrorRecovery::new(config);
    recovery.record_error(ErrorType::Connection);
    assert!(!recovery.record_error(ErrorType::Parsing));
    assert!(recovery.record_error(ErrorType::Parsing));
    // Connection errors have their own budget.
    assert_eq!(recovery.error_count(ErrorType::Connection), 1);
}

#[test]
fn test_first_reset_is_immediate() {
    let recovery = ErrorRecovery::new(RecoveryConfig::default());
    assert!(recovery.should_reset_with_backoff_at(0.0));
}

#[test]
fn test_backoff_progression() {
    let mut recovery = ErrorRecovery::new(RecoveryConfig::default());

    recovery.record_reset_at(100.0);
    // One reset: the initial one-second window gates the next.
    assert!(!recovery.should_reset_with_backoff_at(100.9));
    assert!(recovery.should_reset_with_backoff_at(101.1));

    recovery.record_reset_at(101.1);
    // Two resets: the window doubles.
    assert!(!recovery.should_reset_with_backoff_at(102.9));
    assert!(recovery.should_reset_with_backoff_at(103.2));

    recovery.record_reset_at(103.2);
    assert_eq!(recovery.current_backoff_seconds(), 4.0);
}

#[test]
fn test_backoff_clamps_at_max() {
    let mut recovery = ErrorRecovery::new(RecoveryConfig {
        max_backoff_seconds: 8.0,
        ..RecoveryConfig::default()
    });
    for i in 0..20 {
        recovery.record_reset_at(i as f64);
    }
    assert_eq!(recovery.current_backoff_seconds(), 8.0);
}

#[test]
fn test_reset_clears_only_triggering_class() {
    let mut recovery = ErrorRecovery::new(RecoveryConfig::default());
    recovery.record_error(ErrorType::Parsing);
    recovery.record_error(ErrorType::Parsing);
    recovery.record_error(ErrorType::Parsing);
    recovery.record_error(ErrorType::Mqtt);

    recovery.record_reset_at(50.0);
    recovery.reset_error_counts(Some(ErrorType::Parsing));
    assert_eq!(recovery.error_count(ErrorType::Parsing), 0);
    assert_eq!(recovery.error_count(ErrorType::Mqtt), 1);
    assert_eq!(recovery.reset_count(), 1);
    assert_eq!(recovery.last_reset_time(), Some(50.0));
}

#[test]
fn test_recovery_stats_document() {
    let mut recovery = ErrorRecovery::new(RecoveryConfig::default());
    recovery.record_error(ErrorType::Serial);
    recovery.record_reset_at(10.0);

    let stats = recovery.stats();
    assert_eq!(stats.reset_count, 1);
    assert_eq!(stats.error_counts[&ErrorType::Serial], 1);
    assert_eq!(stats.current_backoff_seconds, 1.0);
    // The stats document serialises for diagnostics.
    serde_json::to_string(&stats).unwrap();
}

fn healthy_monitor(now: f64) -> HealthMonitor {
    let monitor = HealthMonitor::new_at(HealthConfig::default(), now);
    monitor.set_serial_connected(true);
    monitor.set_mqtt_connected_at(true, now);
    monitor.set_lora_cache_connected(true);
    monitor.record_successful_packet_at(now);
    monitor
}

#[test]
fn test_health_document_shape() {
    let monitor = healthy_monitor(1000.0);
    monitor.record_mqtt_publish(true);
    monitor.record_mqtt_publish(false);

    let doc = monitor.document_at(1060.0);
    assert_eq!(doc.status, HealthState::Healthy);
    assert_eq!(doc.uptime_seconds, 60.0);
    assert!(doc.connections.serial && doc.connections.mqtt && doc.connections.lora_cache);
    assert_eq!(doc.metrics.mqtt.publishes, 1);
    assert_eq!(doc.metrics.mqtt.failures, 1);
    assert_eq!(doc.metrics.mqtt.success_rate, 0.5);
    assert!(doc.timestamp.ends_with('Z'));

    let json = serde_json::to_value(&doc).unwrap();
    assert_eq!(json["status"], "healthy");
    assert!(json["metrics"]["packets"]["successful"].is_u64());
}

#[test]
fn test_success_ratio_rules() {
    let monitor = healthy_monitor(1000.0);
    for _ in 0..7 {
        monitor.record_successful_packet_at(1001.0);
    }
    monitor.record_parsing_error();
    monitor.record_parsing_error();
    // 8 ok / 2 failed -> ratio 0.8; parsing errors present but ratio not
    // below the unhealthy bound, and not degraded either at exactly 0.8.
    assert_eq!(monitor.document_at(1002.0).status, HealthState::Healthy);

    monitor.record_parsing_error();
    // 8 ok / 3 failed -> ratio ~0.727 with parsing errors -> unhealthy.
    assert_eq!(monitor.document_at(1003.0).status, HealthState::Unhealthy);
}

#[test]
fn test_report_interval_gating() {
    let monitor = healthy_monitor(1000.0);
    assert!(monitor.report_due_at(1000.0));
    monitor.mark_reported_at(1000.0);
    assert!(!monitor.report_due_at(1030.0));
    assert!(monitor.report_due_at(1060.0));
}

#[test]
fn test_health_file_round_trip() {
    let monitor = healthy_monitor(1000.0);
    let doc = monitor.document_at(1001.0);
    HealthMonitor::write_health_file(&doc).unwrap();

    let raw = std::fs::read_to_string(HealthMonitor::health_file_path()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["status"], "healthy");
    assert!(parsed["connections"]["serial"].as_bool().unwrap());
}

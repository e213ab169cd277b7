//! Integration tests for the publish rate limiter and the command grammar
//! that retunes it.

use std::time::{Duration, Instant};
use uwb_bridge_rs::mqtt::publisher::parse_rate_limit_command;
use uwb_bridge_rs::mqtt::RateLimit;

#[test]
fn test_first_publish_always_allowed() {
    let limit = RateLimit::new(10.0);
    assert!(limit.try_acquire_at(Instant::now()));
}

#[test]
fn test_interval_enforced() {
    let limit = RateLimit::new(10.0);
    let t0 = Instant::now();
    assert!(limit.try_acquire_at(t0));
    assert!(!limit.try_acquire_at(t0 + Duration::from_secs_f64(9.9)));
    assert!(limit.try_acquire_at(t0 + Duration::from_secs_f64(10.0)));
}

#[test]
fn test_skipped_attempts_do_not_extend_window() {
    let limit = RateLimit::new(10.0);
    let t0 = Instant::now();
    assert!(limit.try_acquire_at(t0));
    // Rejected attempts are skipped, not queued, and do not move the clock.
    for i in 1..10 {
        assert!(!limit.try_acquire_at(t0 + Duration::from_secs(i)));
    }
    assert!(limit.try_acquire_at(t0 + Duration::from_secs(10)));
}

/// Lowering the interval through the command path takes effect immediately.
#[test]
fn test_live_rate_change() {
    let limit = RateLimit::new(10.0);
    let t0 = Instant::now();
    assert!(limit.try_acquire_at(t0));

    let new_rate = parse_rate_limit_command("set rate_limit 2").unwrap();
    limit.set_interval_seconds(new_rate);
    assert_eq!(limit.interval_seconds(), 2.0);

    // Within 2.1 s a publish goes out; a follow-up inside 1.9 s does not.
    let t1 = t0 + Duration::from_secs_f64(2.1);
    assert!(limit.try_acquire_at(t1));
    assert!(!limit.try_acquire_at(t1 + Duration::from_secs_f64(1.9)));
    assert!(limit.try_acquire_at(t1 + Duration::from_secs_f64(2.0)));
}

#[test]
fn test_unparseable_commands_are_ignored() {
    for bad in [
        "set rate_limit",
        "set rate_limit zero",
        "set rate_limit -1",
        "rate_limit 5",
        "SET RATE_LIMIT 5",
    ] {
        assert_eq!(parse_rate_limit_command(bad), None, "{bad}");
    }
}

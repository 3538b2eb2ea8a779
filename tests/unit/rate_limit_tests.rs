//! Unit tests for the per-user rate limiter.

use std::time::{Duration, Instant};

use agent_switchboard::rate_limit::RateLimiter;

#[test]
fn second_message_inside_interval_is_denied() {
    let limiter = RateLimiter::new();
    let start = Instant::now();
    let interval = Duration::from_secs(10);

    assert!(limiter.check_at("alice", interval, start));
    assert!(!limiter.check_at("alice", interval, start + Duration::from_secs(3)));
    assert!(limiter.check_at("alice", interval, start + Duration::from_secs(10)));
}

/// A denied attempt does not push the window forward.
#[test]
fn denial_does_not_restart_the_window() {
    let limiter = RateLimiter::new();
    let start = Instant::now();
    let interval = Duration::from_secs(10);

    assert!(limiter.check_at("bob", interval, start));
    assert!(!limiter.check_at("bob", interval, start + Duration::from_secs(9)));
    assert!(limiter.check_at("bob", interval, start + Duration::from_secs(11)));
}

#[test]
fn users_are_independent_and_reset_forgets() {
    let limiter = RateLimiter::new();
    let interval = Duration::from_secs(60);

    assert!(limiter.check("alice", interval));
    assert!(limiter.check("carol", interval));
    assert!(!limiter.check("alice", interval));

    limiter.reset("alice");
    assert!(limiter.check("alice", interval));
}

#[test]
fn zero_interval_always_allows() {
    let limiter = RateLimiter::new();
    for _ in 0..5 {
        assert!(limiter.check("dave", Duration::ZERO));
    }
}

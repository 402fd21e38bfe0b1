use std::time::Duration;

use proxy_pool::breaker::{BreakerConfig, CircuitBreakerRegistry};
use proxy_pool::{BreakerState, ProxyId, Scheme, TestClock};

fn id(host: &str) -> ProxyId {
	ProxyId::new(host, 8080, Scheme::Http)
}

#[test]
fn opens_after_failure_threshold_within_window() {
	let clock = TestClock::new();
	let config = BreakerConfig {
		failure_threshold: 5,
		..BreakerConfig::default()
	};
	let registry = CircuitBreakerRegistry::new(config, clock.clone());
	let proxy = id("10.0.0.1");

	for _ in 0..4 {
		registry.record_failure(&proxy);
	}
	assert_eq!(registry.state_of(&proxy), Some(BreakerState::Closed));
	assert!(registry.allows(&proxy));

	registry.record_failure(&proxy);
	assert_eq!(registry.state_of(&proxy), Some(BreakerState::Open));
	assert!(!registry.allows(&proxy));
}

#[test]
fn half_open_after_cooldown_then_closes_on_success() {
	let clock = TestClock::new();
	let config = BreakerConfig {
		failure_threshold: 2,
		cooldown: Duration::from_secs(30),
		..BreakerConfig::default()
	};
	let registry = CircuitBreakerRegistry::new(config, clock.clone());
	let proxy = id("10.0.0.1");

	registry.record_failure(&proxy);
	registry.record_failure(&proxy);
	assert_eq!(registry.state_of(&proxy), Some(BreakerState::Open));
	assert!(!registry.allows(&proxy));

	clock.advance(Duration::from_secs(31));
	assert!(registry.allows(&proxy));
	assert_eq!(registry.state_of(&proxy), Some(BreakerState::HalfOpen));

	registry.record_success(&proxy);
	assert_eq!(registry.state_of(&proxy), Some(BreakerState::Closed));
}

#[test]
fn failure_in_half_open_reopens_and_extends_cooldown_exponentially() {
	let clock = TestClock::new();
	let config = BreakerConfig {
		failure_threshold: 1,
		cooldown: Duration::from_secs(10),
		exponential_half_open_backoff: true,
		max_cooldown: Duration::from_secs(60),
		..BreakerConfig::default()
	};
	let registry = CircuitBreakerRegistry::new(config, clock.clone());
	let proxy = id("10.0.0.1");

	registry.record_failure(&proxy);
	assert_eq!(registry.state_of(&proxy), Some(BreakerState::Open));

	clock.advance(Duration::from_secs(11));
	assert!(registry.allows(&proxy));

	registry.record_failure(&proxy);
	assert_eq!(registry.state_of(&proxy), Some(BreakerState::Open));

	// First cooldown was 10s; a failure in half-open doubles it to 20s, so
	// 15s later the breaker must still deny.
	clock.advance(Duration::from_secs(15));
	assert!(!registry.allows(&proxy));
}

#[test]
fn reset_forces_closed_regardless_of_history() {
	let clock = TestClock::new();
	let registry = CircuitBreakerRegistry::new(
		BreakerConfig {
			failure_threshold: 1,
			..BreakerConfig::default()
		},
		clock,
	);
	let proxy = id("10.0.0.1");
	registry.record_failure(&proxy);
	assert_eq!(registry.state_of(&proxy), Some(BreakerState::Open));

	registry.reset(&proxy);
	assert_eq!(registry.state_of(&proxy), None);
	assert!(registry.allows(&proxy));
}

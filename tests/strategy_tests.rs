use std::sync::Arc;
use std::time::Duration;

use proxy_pool::breaker::{BreakerConfig, CircuitBreakerRegistry};
use proxy_pool::pool::Pool;
use proxy_pool::session::SessionManager;
use proxy_pool::strategy::{self, RotationStrategy, SelectionContext, StrategyConfig, StrategyEngine};
use proxy_pool::{HealthStatus, Scheme, TestClock};

fn identity(host: &str) -> proxy_pool::ProxyIdentity {
	proxy_pool::ProxyIdentity::build(
		host.to_string(),
		8080,
		Scheme::Http,
		"test".to_string(),
		None,
		None,
		chrono::Utc::now(),
	)
	.expect("valid identity")
}

fn build_engine(clock: Arc<TestClock>, strategy_name: &str) -> (StrategyEngine, Vec<proxy_pool::ProxyId>) {
	let pool = Arc::new(Pool::new(clock.clone(), Duration::from_secs(60), 0.3));
	let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerConfig::default(), clock.clone()));
	let sessions = Arc::new(SessionManager::new(Duration::from_secs(600), clock.clone()));

	let mut ids = Vec::new();
	for host in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
		let id = pool.add(identity(host)).unwrap();
		pool.set_health(&id, HealthStatus::Healthy).unwrap();
		ids.push(id);
	}

	let strategy = strategy::build(strategy_name, &StrategyConfig::default()).expect("known strategy name");
	let engine = StrategyEngine::new(strategy, pool, breakers, sessions);
	(engine, ids)
}

#[test]
fn round_robin_visits_every_candidate_before_repeating() {
	let clock = TestClock::new();
	let (engine, ids) = build_engine(clock, "round_robin");
	let ctx = SelectionContext::default();

	let mut seen = std::collections::HashSet::new();
	for _ in 0..ids.len() {
		let picked = engine.select(&ctx).expect("selection succeeds");
		engine.record_result(&picked, true, Some(10.0));
		seen.insert(picked);
	}
	assert_eq!(seen.len(), ids.len());
}

#[test]
fn least_used_prefers_proxy_with_fewest_started_requests() {
	let clock = TestClock::new();
	let (engine, ids) = build_engine(clock, "least_used");
	let ctx = SelectionContext::default();

	// Drive requests_started up on the first two candidates so the third
	// becomes the only "least used" proxy.
	for id in &ids[..2] {
		for _ in 0..5 {
			engine.pool().start_request(id).unwrap();
		}
	}

	let picked = engine.select(&ctx).expect("selection succeeds");
	assert_eq!(&picked, &ids[2]);
}

#[test]
fn selection_excludes_proxies_with_open_breakers() {
	let clock = TestClock::new();
	let (engine, ids) = build_engine(clock, "round_robin");

	for _ in 0..5 {
		engine.breakers().record_failure(&ids[0]);
	}
	assert_eq!(
		engine.breakers().state_of(&ids[0]),
		Some(proxy_pool::BreakerState::Open)
	);

	let ctx = SelectionContext::default();
	for _ in 0..10 {
		let picked = engine.select(&ctx).expect("selection succeeds");
		assert_ne!(picked, ids[0]);
		engine.record_result(&picked, true, Some(5.0));
	}
}

#[test]
fn hot_swap_takes_effect_on_next_select() {
	let clock = TestClock::new();
	let (engine, _ids) = build_engine(clock, "round_robin");

	let swapped: Arc<dyn RotationStrategy> =
		strategy::build("least_used", &StrategyConfig::default()).expect("known strategy name");
	engine.swap(swapped);

	let ctx = SelectionContext::default();
	// After swapping to least_used with all counters equal, selection must
	// still succeed deterministically (tie-break by id string).
	let first = engine.select(&ctx).expect("selection succeeds");
	engine.record_result(&first, true, Some(1.0));
	let second = engine.select(&ctx).expect("selection succeeds");
	assert_ne!(first, second);
}

#[test]
fn composite_is_registered_under_its_own_name() {
	let clock = TestClock::new();
	let (engine, _ids) = build_engine(clock, "composite");
	let ctx = SelectionContext::default();
	engine.select(&ctx).expect("composite with no filters picks via its selector");
}

#[test]
fn build_rejects_unregistered_strategy_name() {
	let err = strategy::build("does_not_exist", &StrategyConfig::default());
	assert!(matches!(err, Err(proxy_pool::PoolError::InvalidConfiguration { field: "strategy.name" })));
}

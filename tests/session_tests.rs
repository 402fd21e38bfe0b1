use std::sync::Arc;
use std::time::Duration;

use proxy_pool::breaker::{BreakerConfig, CircuitBreakerRegistry};
use proxy_pool::pool::Pool;
use proxy_pool::session::SessionManager;
use proxy_pool::strategy::{self, SelectionContext, StrategyConfig, StrategyEngine};
use proxy_pool::{HealthStatus, Scheme, TestClock};

fn identity(host: &str, country: &str) -> proxy_pool::ProxyIdentity {
	proxy_pool::ProxyIdentity::build(
		host.to_string(),
		8080,
		Scheme::Http,
		"test".to_string(),
		Some(country.to_string()),
		None,
		chrono::Utc::now(),
	)
	.expect("valid identity")
}

fn build_engine(clock: Arc<TestClock>, strategy_name: &str, cfg: &StrategyConfig) -> StrategyEngine {
	let pool = Arc::new(Pool::new(clock.clone(), Duration::from_secs(60), 0.3));
	let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerConfig::default(), clock.clone()));
	let sessions = Arc::new(SessionManager::new(Duration::from_secs(600), clock.clone()));
	for (host, country) in [("10.0.0.1", "US"), ("10.0.0.2", "DE"), ("10.0.0.3", "US")] {
		let id = pool.add(identity(host, country)).unwrap();
		pool.set_health(&id, HealthStatus::Healthy).unwrap();
	}
	let strategy = strategy::build(strategy_name, cfg).expect("known strategy name");
	StrategyEngine::new(strategy, pool, breakers, sessions)
}

#[test]
fn session_sticks_to_the_same_proxy_across_selections() {
	let clock = TestClock::new();
	let engine = build_engine(clock, "session_persistence", &StrategyConfig::default());

	let mut ctx = SelectionContext::default();
	ctx.session_id = Some("session-a".to_string());

	let first = engine.select(&ctx).expect("first selection succeeds");
	engine.record_result(&first, true, Some(5.0));

	for _ in 0..5 {
		let again = engine.select(&ctx).expect("sticky selection succeeds");
		assert_eq!(again, first);
		engine.record_result(&again, true, Some(5.0));
	}
}

#[test]
fn session_rebinds_after_bound_proxy_is_removed() {
	let clock = TestClock::new();
	let engine = build_engine(clock, "session_persistence", &StrategyConfig::default());

	let mut ctx = SelectionContext::default();
	ctx.session_id = Some("session-b".to_string());

	let first = engine.select(&ctx).expect("first selection succeeds");
	engine.record_result(&first, true, Some(5.0));

	assert!(engine.pool().remove(&first));
	engine.breakers().remove(&first);
	engine.sessions().close_for_proxy(&first);

	let rebound = engine.select(&ctx).expect("rebinding selection succeeds");
	assert_ne!(rebound, first);
}

#[test]
fn geo_targeted_filters_by_country_then_falls_back() {
	let clock = TestClock::new();
	let cfg = StrategyConfig {
		secondary_strategy_name: Some("round_robin".to_string()),
		geo_fallback_enabled: true,
		..StrategyConfig::default()
	};
	let engine = build_engine(clock, "geo_targeted", &cfg);

	let mut ctx = SelectionContext::default();
	ctx.target_country = Some("DE".to_string());
	for _ in 0..5 {
		let picked = engine.select(&ctx).expect("country-filtered selection succeeds");
		let snap = engine.pool().get(&picked).expect("picked proxy exists");
		assert_eq!(snap.identity.country_code.as_deref(), Some("DE"));
		engine.record_result(&picked, true, Some(5.0));
	}

	ctx.target_country = Some("FR".to_string());
	let picked = engine.select(&ctx).expect("falls back when no FR proxies exist");
	let snap = engine.pool().get(&picked).expect("picked proxy exists");
	assert_ne!(snap.identity.country_code.as_deref(), Some("FR"));
}

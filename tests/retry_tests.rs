use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proxy_pool::breaker::{BreakerConfig, CircuitBreakerRegistry};
use proxy_pool::pool::Pool;
use proxy_pool::retry::{HttpMethod, Outcome, RetryExecutor, RetryPolicy};
use proxy_pool::session::SessionManager;
use proxy_pool::strategy::{self, SelectionContext, StrategyConfig, StrategyEngine};
use proxy_pool::{HealthStatus, PoolError, Scheme, TestClock};

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

fn build_engine(clock: Arc<TestClock>, breaker_config: BreakerConfig, n: usize) -> StrategyEngine {
	let pool = Arc::new(Pool::new(clock.clone(), Duration::from_secs(60), 0.3));
	let breakers = Arc::new(CircuitBreakerRegistry::new(breaker_config, clock.clone()));
	let sessions = Arc::new(SessionManager::new(Duration::from_secs(600), clock.clone()));
	for i in 0..n {
		let host = format!("10.0.0.{i}");
		let id = pool.add(identity(&host)).unwrap();
		pool.set_health(&id, HealthStatus::Healthy).unwrap();
	}
	let strategy = strategy::build("round_robin", &StrategyConfig::default()).expect("known strategy name");
	StrategyEngine::new(strategy, pool, breakers, sessions)
}

#[tokio::test]
async fn succeeds_on_first_try_without_retrying() {
	let clock = TestClock::new();
	let engine = build_engine(clock, BreakerConfig::default(), 3);
	let executor = RetryExecutor::new(&engine, RetryPolicy::default());

	let calls = AtomicUsize::new(0);
	let (outcome, attempts) = executor
		.execute(SelectionContext::default(), HttpMethod::Get, |_id| {
			calls.fetch_add(1, Ordering::SeqCst);
			async { Outcome::Success { latency_ms: 12.0 } }
		})
		.await
		.expect("executes successfully");

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(attempts.len(), 1);
	assert!(matches!(outcome, Outcome::Success { .. }));
}

#[tokio::test]
async fn retries_on_timeout_and_excludes_failed_proxy() {
	let clock = TestClock::new();
	let engine = build_engine(clock, BreakerConfig::default(), 3);
	let policy = RetryPolicy {
		max_attempts: 3,
		base_delay: Duration::from_millis(1),
		max_backoff: Duration::from_millis(5),
		..RetryPolicy::default()
	};
	let executor = RetryExecutor::new(&engine, policy);

	let seen = std::sync::Mutex::new(Vec::new());
	let (outcome, attempts) = executor
		.execute(SelectionContext::default(), HttpMethod::Get, |id| {
			seen.lock().unwrap().push(id);
			async { Outcome::Timeout }
		})
		.await
		.expect("executor returns a terminal outcome, not an error, once exhausted");

	assert!(matches!(outcome, Outcome::Timeout));
	assert_eq!(attempts.len(), 3);
	let seen = seen.lock().unwrap();
	let unique: std::collections::HashSet<_> = seen.iter().collect();
	assert_eq!(unique.len(), 3, "each retry must exclude the previously failed proxy");
}

#[tokio::test]
async fn non_retryable_http_status_stops_immediately() {
	let clock = TestClock::new();
	let engine = build_engine(clock, BreakerConfig::default(), 3);
	let executor = RetryExecutor::new(&engine, RetryPolicy::default());

	let calls = AtomicUsize::new(0);
	let (outcome, attempts) = executor
		.execute(SelectionContext::default(), HttpMethod::Get, |_id| {
			calls.fetch_add(1, Ordering::SeqCst);
			async {
				Outcome::HttpStatus {
					code: 404,
					latency_ms: 3.0,
				}
			}
		})
		.await
		.expect("executes without error");

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(attempts.len(), 1);
	assert!(matches!(outcome, Outcome::HttpStatus { code: 404, .. }));
}

#[tokio::test]
async fn all_breakers_open_aborts_with_service_unavailable() {
	let clock = TestClock::new();
	let engine = build_engine(
		clock,
		BreakerConfig {
			failure_threshold: 1,
			..BreakerConfig::default()
		},
		2,
	);

	// Force every proxy's breaker open before the executor ever runs.
	let ids: Vec<_> = engine.pool().iter_all().into_iter().map(|s| s.identity.id).collect();
	for id in &ids {
		engine.breakers().record_failure(id);
	}

	let executor = RetryExecutor::new(&engine, RetryPolicy::default());
	let result = executor
		.execute(SelectionContext::default(), HttpMethod::Get, |_id| async {
			Outcome::Success { latency_ms: 1.0 }
		})
		.await;

	assert!(matches!(result, Err(PoolError::ServiceUnavailable)));
}

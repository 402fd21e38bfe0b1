use std::sync::Arc;
use std::time::Duration;

use proxy_pool::{HealthStatus, Pool, Scheme, TestClock};

fn identity(host: &str, port: u16) -> proxy_pool::ProxyIdentity {
	proxy_pool::ProxyIdentity::build(
		host.to_string(),
		port,
		Scheme::Http,
		"test".to_string(),
		Some("us".to_string()),
		None,
		chrono::Utc::now(),
	)
	.expect("valid identity")
}

#[test]
fn add_rejects_duplicates_by_host_port_scheme() {
	let clock = TestClock::new();
	let pool = Pool::new(clock, Duration::from_secs(60), 0.3);

	pool.add(identity("10.0.0.1", 8080)).expect("first add");
	let err = pool.add(identity("10.0.0.1", 8080));
	assert!(err.is_err());
}

#[test]
fn snapshot_healthy_excludes_unknown_and_unhealthy() {
	let clock = TestClock::new();
	let pool = Pool::new(clock, Duration::from_secs(60), 0.3);

	let id_a = pool.add(identity("10.0.0.1", 8080)).unwrap();
	let id_b = pool.add(identity("10.0.0.2", 8080)).unwrap();

	// Neither proxy has been marked healthy yet.
	assert!(pool.snapshot_healthy(None).is_empty());

	pool.set_health(&id_a, HealthStatus::Healthy).unwrap();
	pool.set_health(&id_b, HealthStatus::Unhealthy).unwrap();

	let healthy = pool.snapshot_healthy(None);
	assert_eq!(healthy.len(), 1);
	assert_eq!(healthy[0].id(), &id_a);
}

#[test]
fn remove_is_idempotent_and_reports_presence() {
	let clock = TestClock::new();
	let pool = Pool::new(clock, Duration::from_secs(60), 0.3);
	let id = pool.add(identity("10.0.0.1", 8080)).unwrap();

	assert!(pool.remove(&id));
	assert!(!pool.contains(&id));
	assert!(!pool.remove(&id));
}

#[test]
fn sliding_window_counts_only_recent_requests() {
	let clock = TestClock::new();
	let pool = Pool::new(clock.clone(), Duration::from_secs(60), 0.3);
	let id = pool.add(identity("10.0.0.1", 8080)).unwrap();
	pool.set_health(&id, HealthStatus::Healthy).unwrap();

	pool.start_request(&id).unwrap();
	let snap = pool.get(&id).unwrap();
	assert_eq!(snap.stats.requests_started, 1);

	clock.advance(Duration::from_secs(120));
	pool.start_request(&id).unwrap();
	let snap = pool.get(&id).unwrap();
	assert_eq!(snap.stats.requests_started, 2);
}

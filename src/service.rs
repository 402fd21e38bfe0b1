use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::breaker::{BreakerState, CircuitBreakerRegistry};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{PoolError, PoolResult};
use crate::health_monitor::HealthMonitor;
use crate::loader::{ingest, IngestReport, Loader};
use crate::metrics::{MetricsSink, NoopSink};
use crate::pool::Pool;
use crate::proxy::{ProxyId, ProxyIdentity, ProxySnapshot, Scheme};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::session::{SessionJanitor, SessionManager};
use crate::strategy::{self, RotationStrategy, SelectionContext, StrategyConfig, StrategyCtor, StrategyEngine};
use crate::validator::{ValidationLevel, Validator, ValidatorConfig};

/// Top-level facade wiring pool + strategy engine + breaker registry +
/// session manager + health monitor behind the single public surface a
/// host embeds (spec.md §6). Everything below this is an internal
/// collaborator; this is the only type most callers construct directly.
pub struct ProxyPoolService {
	pool: Arc<Pool>,
	breakers: Arc<CircuitBreakerRegistry>,
	sessions: Arc<SessionManager>,
	engine: StrategyEngine,
	validator: Arc<Validator>,
	validator_config: ValidatorConfig,
	health_monitor: HealthMonitor,
	session_janitor: SessionJanitor,
	session_janitor_interval: Duration,
	metrics: Arc<dyn MetricsSink>,
	retry_policy: parking_lot::RwLock<RetryPolicy>,
	clock: Arc<dyn Clock>,
	local_ip: String,
}

impl ProxyPoolService {
	pub fn new(config: Config) -> PoolResult<Self> {
		config.validate()?;
		Self::with_clock(config, Arc::new(SystemClock))
	}

	pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> PoolResult<Self> {
		config.validate()?;

		let pool = Arc::new(Pool::new(
			clock.clone(),
			Duration::from_secs(config.pool.window_secs),
			config.pool.ema_alpha,
		));
		let breakers = Arc::new(CircuitBreakerRegistry::new(
			config.breaker.to_breaker_config(),
			clock.clone(),
		));
		let sessions = Arc::new(SessionManager::new(
			Duration::from_secs(config.session.ttl_secs),
			clock.clone(),
		));

		let strategy_cfg = StrategyConfig {
			ema_alpha: config.pool.ema_alpha,
			session_ttl_secs: config.strategy.session_ttl_secs,
			fallback_strategy_name: None,
			secondary_strategy_name: None,
			preferred_countries: config.strategy.preferred_countries.clone(),
			weights: None,
			geo_fallback_enabled: config.strategy.geo_fallback_enabled,
		};
		let initial_strategy = strategy::build(&config.strategy.default_strategy, &strategy_cfg)?;
		let engine = StrategyEngine::new(initial_strategy, pool.clone(), breakers.clone(), sessions.clone());

		let validator_config = config.validation.to_validator_config();
		let validator = Arc::new(Validator::new(validator_config.clone()));

		Ok(ProxyPoolService {
			pool,
			breakers,
			sessions,
			engine,
			validator,
			validator_config,
			health_monitor: HealthMonitor::new(),
			session_janitor: SessionJanitor::new(),
			session_janitor_interval: Duration::from_secs(config.session.janitor_interval_secs),
			metrics: Arc::new(NoopSink),
			retry_policy: parking_lot::RwLock::new(config.retry.to_retry_policy()),
			clock,
			local_ip: config.health.local_ip.clone(),
		})
	}

	pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
		self.metrics = sink;
		self
	}

	pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
		&self.metrics
	}

	// --- lifecycle -------------------------------------------------------

	pub fn add_proxy(
		&self,
		host: impl Into<String>,
		port: u16,
		scheme: Scheme,
		source_tag: impl Into<String>,
	) -> PoolResult<ProxyId> {
		let identity = ProxyIdentity::build(
			host.into(),
			port,
			scheme,
			source_tag.into(),
			None,
			None,
			Utc::now(),
		)?;
		let id = self.pool.add(identity)?;
		self.metrics.incr_counter("proxy_added", Some(id.as_str()));
		Ok(id)
	}

	/// Removes a proxy and cascades into the breaker registry and session
	/// manager, which `Pool::remove` alone does not do (spec.md §4.1/§4.5
	/// edge cases: a removed proxy's breaker is destroyed and its sessions
	/// closed, not left to expire or deny phantom traffic).
	pub fn remove_proxy(&self, id: &ProxyId) -> bool {
		let removed = self.pool.remove(id);
		if removed {
			self.breakers.remove(id);
			self.sessions.close_for_proxy(id);
			self.metrics.incr_counter("proxy_removed", Some(id.as_str()));
		}
		removed
	}

	pub fn list(&self) -> Vec<ProxySnapshot> {
		self.pool.iter_all()
	}

	pub fn get(&self, id: &ProxyId) -> Option<ProxySnapshot> {
		self.pool.get(id)
	}

	pub fn len(&self) -> usize {
		self.pool.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pool.is_empty()
	}

	// --- selection ---------------------------------------------------------

	pub fn select(&self, ctx: &SelectionContext) -> PoolResult<ProxyId> {
		let result = self.engine.select(ctx);
		match &result {
			Ok(id) => self.metrics.incr_counter("selection_success", Some(id.as_str())),
			Err(_) => self.metrics.incr_counter("selection_failure", None),
		}
		result
	}

	pub fn record_result(&self, id: &ProxyId, success: bool, latency_ms: Option<f64>) {
		self.engine.record_result(id, success, latency_ms);
		if let Some(latency) = latency_ms {
			self.metrics.observe_histogram("request_latency_ms", latency);
		}
	}

	pub fn set_strategy(&self, name: &str, cfg: &StrategyConfig) -> PoolResult<()> {
		let strategy = strategy::build(name, cfg)?;
		self.engine.swap(strategy);
		Ok(())
	}

	pub fn set_strategy_instance(&self, strategy: Arc<dyn RotationStrategy>) {
		self.engine.swap(strategy);
	}

	pub fn register_strategy(&self, name: &'static str, ctor: StrategyCtor) {
		strategy::register_strategy(name, ctor);
	}

	// --- resilience ----------------------------------------------------

	pub fn reset_breaker(&self, id: &ProxyId) {
		self.breakers.reset(id);
	}

	pub fn breaker_state(&self, id: &ProxyId) -> Option<BreakerState> {
		self.breakers.state_of(id)
	}

	pub fn breaker_snapshot(&self) -> std::collections::HashMap<ProxyId, BreakerState> {
		self.breakers.snapshot_states()
	}

	pub fn retry_policy(&self) -> RetryPolicy {
		self.retry_policy.read().clone()
	}

	pub fn set_retry_policy(&self, policy: RetryPolicy) {
		*self.retry_policy.write() = policy;
	}

	pub fn retry_executor(&self) -> RetryExecutor<'_> {
		RetryExecutor::new(&self.engine, self.retry_policy.read().clone())
	}

	// --- ingestion / persistence -----------------------------------------

	pub async fn fetch_proxies(&self, loaders: &[Box<dyn Loader>], validate_at: ValidationLevel) -> IngestReport {
		let report = ingest(&self.pool, loaders, &self.validator_config, validate_at, &self.local_ip).await;
		self
			.metrics
			.set_gauge("pool_size", self.pool.len() as f64);
		report
	}

	pub async fn validate_proxies(&self, level: ValidationLevel) -> Vec<crate::validator::ValidationRecord> {
		let identities: Vec<ProxyIdentity> = self
			.pool
			.iter_all()
			.into_iter()
			.map(|snap| snap.identity)
			.collect();
		let validator = Validator::new(ValidatorConfig {
			level,
			..self.validator_config.clone()
		});
		validator.validate_batch(&identities, &self.local_ip).await
	}

	// --- health monitor --------------------------------------------------

	pub fn start_health_monitor(&self, config: crate::health_monitor::HealthMonitorConfig) {
		self
			.health_monitor
			.start(self.pool.clone(), self.breakers.clone(), self.validator.clone(), config);
	}

	pub fn stop_health_monitor(&self) {
		self.health_monitor.stop();
	}

	pub fn is_health_monitor_running(&self) -> bool {
		self.health_monitor.is_running()
	}

	pub fn cleanup_expired_sessions(&self) -> usize {
		self.sessions.cleanup_expired()
	}

	pub fn start_session_janitor(&self) {
		self
			.session_janitor
			.start(self.sessions.clone(), self.session_janitor_interval);
	}

	pub fn stop_session_janitor(&self) {
		self.session_janitor.stop();
	}

	pub fn is_session_janitor_running(&self) -> bool {
		self.session_janitor.is_running()
	}

	pub fn clock(&self) -> &Arc<dyn Clock> {
		&self.clock
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn add_and_remove_cascades_breaker_and_session() {
		let service = ProxyPoolService::new(Config::default()).expect("valid default config");
		let id = service
			.add_proxy("203.0.113.1", 8080, Scheme::Http, "test")
			.expect("add succeeds");
		service.breakers.record_failure(&id);
		assert!(service.breaker_state(&id).is_some());

		assert!(service.remove_proxy(&id));
		assert!(service.breaker_state(&id).is_none());
		assert!(!service.pool.contains(&id));
	}

	#[test]
	fn duplicate_add_is_rejected() {
		let service = ProxyPoolService::new(Config::default()).expect("valid default config");
		service
			.add_proxy("203.0.113.2", 8080, Scheme::Http, "test")
			.expect("first add succeeds");
		let err = service.add_proxy("203.0.113.2", 8080, Scheme::Http, "test");
		assert!(matches!(err, Err(PoolError::DuplicateProxy(_))));
	}
}

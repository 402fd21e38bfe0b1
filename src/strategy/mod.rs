mod composite;
mod geo;
mod least_used;
mod performance;
mod random;
mod round_robin;
mod session_persistence;
mod weighted;

pub use composite::{Composite, Filter};
pub use geo::GeoTargeted;
pub use least_used::LeastUsed;
pub use performance::PerformanceBased;
pub use random::Random;
pub use round_robin::RoundRobin;
pub use session_persistence::SessionPersistence;
pub use weighted::Weighted;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::breaker::CircuitBreakerRegistry;
use crate::error::{ExhaustedReason, PoolError};
use crate::pool::Pool;
use crate::proxy::{ProxyId, ProxySnapshot};
use crate::session::SessionManager;

/// Request-scoped, immutable selection inputs (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
	pub session_id: Option<String>,
	pub target_country: Option<String>,
	pub target_region: Option<String>,
	pub excluded_proxy_ids: HashSet<ProxyId>,
	pub priority: Option<i32>,
	pub max_latency_ms: Option<f64>,
	pub min_success_rate: Option<f64>,
}

/// Immutable bundle of knobs a strategy is constructed from (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct StrategyConfig {
	pub ema_alpha: f64,
	pub session_ttl_secs: u64,
	pub fallback_strategy_name: Option<String>,
	pub secondary_strategy_name: Option<String>,
	pub preferred_countries: Vec<String>,
	pub weights: Option<HashMap<ProxyId, f64>>,
	pub geo_fallback_enabled: bool,
}

/// The four-operation selection contract every strategy implements
/// (spec.md §4.4). `pick` receives the already breaker-admitted,
/// already-excluded candidate set; strategies only decide *which* of
/// those to return.
pub trait RotationStrategy: Send + Sync {
	fn pick(
		&self,
		candidates: &[ProxySnapshot],
		sessions: &SessionManager,
		ctx: &SelectionContext,
	) -> Result<ProxyId, PoolError>;

	fn validate_requirements(&self, _candidates: &[ProxySnapshot]) -> Result<(), PoolError> {
		Ok(())
	}

	fn declared_metadata(&self) -> &'static [&'static str] {
		&[]
	}
}

pub type StrategyCtor =
	Arc<dyn Fn(&StrategyConfig) -> Result<Arc<dyn RotationStrategy>, PoolError> + Send + Sync>;

static REGISTRY: Lazy<RwLock<HashMap<&'static str, StrategyCtor>>> = Lazy::new(|| {
	let mut map: HashMap<&'static str, StrategyCtor> = HashMap::new();
	map.insert("round_robin", Arc::new(|_cfg: &StrategyConfig| {
		Ok(Arc::new(RoundRobin::new()) as Arc<dyn RotationStrategy>)
	}));
	map.insert("random", Arc::new(|_cfg: &StrategyConfig| {
		Ok(Arc::new(Random::new()) as Arc<dyn RotationStrategy>)
	}));
	map.insert("weighted", Arc::new(|cfg: &StrategyConfig| {
		Ok(Arc::new(Weighted::new(cfg.weights.clone())) as Arc<dyn RotationStrategy>)
	}));
	map.insert("least_used", Arc::new(|_cfg: &StrategyConfig| {
		Ok(Arc::new(LeastUsed::new()) as Arc<dyn RotationStrategy>)
	}));
	map.insert("performance", Arc::new(|cfg: &StrategyConfig| {
		Ok(Arc::new(PerformanceBased::new(cfg.fallback_strategy_name.clone())) as Arc<dyn RotationStrategy>)
	}));
	map.insert("session_persistence", Arc::new(|cfg: &StrategyConfig| {
		let fallback_name = cfg
			.fallback_strategy_name
			.clone()
			.unwrap_or_else(|| "round_robin".to_string());
		let fallback = build(&fallback_name, cfg)?;
		Ok(Arc::new(SessionPersistence::new(fallback)) as Arc<dyn RotationStrategy>)
	}));
	map.insert("geo_targeted", Arc::new(|cfg: &StrategyConfig| {
		let secondary_name = cfg
			.secondary_strategy_name
			.clone()
			.unwrap_or_else(|| "round_robin".to_string());
		let secondary = build(&secondary_name, cfg)?;
		Ok(Arc::new(GeoTargeted::new(cfg.geo_fallback_enabled, secondary)) as Arc<dyn RotationStrategy>)
	}));
	map.insert("composite", Arc::new(|cfg: &StrategyConfig| {
		let fallback = cfg
			.fallback_strategy_name
			.clone()
			.map(|name| build(&name, cfg))
			.transpose()?;
		Ok(Arc::new(Composite::new(Vec::new(), Arc::new(RoundRobin::new()), fallback)) as Arc<dyn RotationStrategy>)
	}));
	RwLock::new(map)
});

/// Registers a named strategy constructor. Idempotent: registering the
/// same name twice is a no-op rather than an error (spec.md §4.4,
/// §8 round-trip property). Built-ins are registered lazily on first use
/// of `REGISTRY`, satisfying the "initialized lazily" rule in spec.md §9.
pub fn register_strategy(name: &'static str, ctor: StrategyCtor) {
	let mut registry = REGISTRY.write();
	registry.entry(name).or_insert(ctor);
}

/// Looks up and constructs a strategy by name. An unregistered name is a
/// configuration error (`InvalidConfiguration`), not a silent substitution
/// — callers that want a concrete fallback must pick one explicitly.
pub fn build(name: &str, cfg: &StrategyConfig) -> Result<Arc<dyn RotationStrategy>, PoolError> {
	let ctor = {
		let registry = REGISTRY.read();
		registry.get(name).cloned()
	};
	match ctor {
		Some(ctor) => ctor(cfg),
		None => Err(PoolError::InvalidConfiguration { field: "strategy.name" }),
	}
}

/// Breaker-admitted, exclusion-filtered candidate set shared by every
/// strategy implementation (spec.md §4.4 rules 1-2).
pub fn admitted_candidates(
	pool: &Pool,
	breakers: &CircuitBreakerRegistry,
	ctx: &SelectionContext,
) -> Vec<ProxySnapshot> {
	pool
		.snapshot_healthy(None)
		.into_iter()
		.filter(|p| breakers.allows(p.id()))
		.filter(|p| !ctx.excluded_proxy_ids.contains(p.id()))
		.filter(|p| {
			ctx
				.min_success_rate
				.map(|min| p.stats.success_rate() >= min)
				.unwrap_or(true)
		})
		.filter(|p| {
			ctx
				.max_latency_ms
				.map(|max| p.stats.ema_latency_ms.map(|l| l <= max).unwrap_or(true))
				.unwrap_or(true)
		})
		.collect()
}

pub(crate) fn exhausted_reason(
	pool: &Pool,
	breakers: &CircuitBreakerRegistry,
	ctx: &SelectionContext,
) -> ExhaustedReason {
	let breaker_admitted_empty = pool
		.snapshot_healthy(None)
		.into_iter()
		.filter(|p| breakers.allows(p.id()))
		.next()
		.is_none();
	pool.classify_empty_reason(breaker_admitted_empty)
}

/// Hot-swappable holder for the active strategy plus the shared state
/// every strategy selects over. Swaps are readers-see-new-immediately: an
/// in-flight `select` call already holds its own `Arc` clone of the old
/// strategy and runs to completion unaffected (spec.md §4.4 hot-swap
/// contract).
pub struct StrategyEngine {
	active: RwLock<Arc<dyn RotationStrategy>>,
	pool: Arc<Pool>,
	breakers: Arc<CircuitBreakerRegistry>,
	sessions: Arc<SessionManager>,
}

impl StrategyEngine {
	pub fn new(
		initial: Arc<dyn RotationStrategy>,
		pool: Arc<Pool>,
		breakers: Arc<CircuitBreakerRegistry>,
		sessions: Arc<SessionManager>,
	) -> Self {
		StrategyEngine {
			active: RwLock::new(initial),
			pool,
			breakers,
			sessions,
		}
	}

	pub fn swap(&self, strategy: Arc<dyn RotationStrategy>) {
		*self.active.write() = strategy;
	}

	pub fn select(&self, ctx: &SelectionContext) -> Result<ProxyId, PoolError> {
		let strategy = self.active.read().clone();
		let candidates = admitted_candidates(&self.pool, &self.breakers, ctx);
		strategy.validate_requirements(&candidates)?;
		if candidates.is_empty() {
			return Err(PoolError::ExhaustedPool(exhausted_reason(
				&self.pool,
				&self.breakers,
				ctx,
			)));
		}
		let chosen = strategy.pick(&candidates, &self.sessions, ctx)?;
		self.pool.start_request(&chosen)?;
		Ok(chosen)
	}

	/// The single, uniform completion path: records the outcome against the
	/// pool and the breaker. Strategies never call `complete_request`
	/// directly (D3 in SPEC_FULL.md).
	pub fn record_result(&self, id: &ProxyId, success: bool, latency_ms: Option<f64>) {
		let _ = self.pool.complete_request(id, success, latency_ms);
		if success {
			self.breakers.record_success(id);
		} else {
			self.breakers.record_failure(id);
		}
	}

	pub fn pool(&self) -> &Arc<Pool> {
		&self.pool
	}

	pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
		&self.breakers
	}

	pub fn sessions(&self) -> &Arc<SessionManager> {
		&self.sessions
	}
}

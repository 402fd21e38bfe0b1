use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::clock::Clock;
use crate::error::{ExhaustedReason, PoolError};
use crate::proxy::{
	AnonymityLevel, HealthStatus, ProxyId, ProxyIdentity, ProxySnapshot, ProxyStats, Scheme,
};

struct ProxyEntry {
	identity: ProxyIdentity,
	stats: Mutex<ProxyStats>,
}

/// Predicate applied while building a selection snapshot: country/region,
/// latency ceiling, and exclusion set all compose here so strategies never
/// need to re-derive admission rules themselves.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
	pub country: Option<String>,
	pub region: Option<String>,
	pub max_latency_ms: Option<f64>,
	pub exclude: Vec<ProxyId>,
}

impl SnapshotFilter {
	fn matches(&self, snap: &ProxySnapshot) -> bool {
		if let Some(country) = &self.country {
			if snap.identity.country_code.as_deref() != Some(country.as_str()) {
				return false;
			}
		}
		if let Some(region) = &self.region {
			if snap.identity.region.as_deref() != Some(region.as_str()) {
				return false;
			}
		}
		if let Some(max_latency) = self.max_latency_ms {
			match snap.stats.ema_latency_ms {
				Some(latency) if latency <= max_latency => {},
				_ => return false,
			}
		}
		if self.exclude.iter().any(|id| id == &snap.identity.id) {
			return false;
		}
		true
	}
}

struct PoolInner {
	order: Vec<ProxyId>,
	by_id: HashMap<ProxyId, Arc<ProxyEntry>>,
	generation: u64,
}

/// The authoritative, concurrent in-memory collection of proxies (C1).
/// Structural mutation (`add`/`remove`) takes the coarse `inner` lock in
/// write mode and bumps `generation`; per-proxy counter/EMA/window updates
/// take only that proxy's own `Mutex`, per the lock-ordering rule in
/// spec.md §5 (`Pool structural lock -> per-proxy stat lock -> ...`).
pub struct Pool {
	inner: RwLock<PoolInner>,
	window_duration: Duration,
	ema_alpha: f64,
	clock: Arc<dyn Clock>,
}

impl Pool {
	pub fn new(clock: Arc<dyn Clock>, window_duration: Duration, ema_alpha: f64) -> Self {
		Pool {
			inner: RwLock::new(PoolInner {
				order: Vec::new(),
				by_id: HashMap::new(),
				generation: 0,
			}),
			window_duration,
			ema_alpha,
			clock,
		}
	}

	pub fn generation(&self) -> u64 {
		self.inner.read().generation
	}

	/// Adds a proxy in the `UNKNOWN` health state. Fails with
	/// `DuplicateProxy` if `(host,port,scheme)` is already present.
	pub fn add(&self, identity: ProxyIdentity) -> Result<ProxyId, PoolError> {
		let mut inner = self.inner.write();
		if inner.by_id.contains_key(&identity.id) {
			return Err(PoolError::DuplicateProxy(identity.id));
		}
		let id = identity.id.clone();
		let now = self.clock.now();
		let stats = ProxyStats::new(now, self.window_duration, self.ema_alpha, Utc::now());
		inner.by_id.insert(
			id.clone(),
			Arc::new(ProxyEntry {
				identity,
				stats: Mutex::new(stats),
			}),
		);
		inner.order.push(id.clone());
		inner.generation += 1;
		Ok(id)
	}

	/// Removes a proxy; a no-op if absent. Returns whether a proxy was
	/// actually removed so callers (the service facade) know whether to
	/// cascade into the breaker registry and session manager.
	pub fn remove(&self, id: &ProxyId) -> bool {
		let mut inner = self.inner.write();
		if inner.by_id.remove(id).is_none() {
			return false;
		}
		inner.order.retain(|existing| existing != id);
		inner.generation += 1;
		true
	}

	pub fn contains(&self, id: &ProxyId) -> bool {
		self.inner.read().by_id.contains_key(id)
	}

	pub fn get(&self, id: &ProxyId) -> Option<ProxySnapshot> {
		let inner = self.inner.read();
		inner.by_id.get(id).map(|entry| ProxySnapshot {
			identity: entry.identity.clone(),
			stats: entry.stats.lock().clone(),
		})
	}

	pub fn iter_all(&self) -> Vec<ProxySnapshot> {
		let inner = self.inner.read();
		inner
			.order
			.iter()
			.filter_map(|id| inner.by_id.get(id))
			.map(|entry| ProxySnapshot {
				identity: entry.identity.clone(),
				stats: entry.stats.lock().clone(),
			})
			.collect()
	}

	/// Returns healthy proxies (optionally further filtered), preserving
	/// insertion order. Circuit breaker admission is layered on by the
	/// caller (strategy engine), which is why this does not take a breaker
	/// registry: `Pool` must not depend on `CircuitBreakerRegistry`.
	pub fn snapshot_healthy(&self, filter: Option<&SnapshotFilter>) -> Vec<ProxySnapshot> {
		let inner = self.inner.read();
		inner
			.order
			.iter()
			.filter_map(|id| inner.by_id.get(id))
			.filter(|entry| entry.stats.lock().status == HealthStatus::Healthy)
			.map(|entry| ProxySnapshot {
				identity: entry.identity.clone(),
				stats: entry.stats.lock().clone(),
			})
			.filter(|snap| filter.map(|f| f.matches(snap)).unwrap_or(true))
			.collect()
	}

	pub fn start_request(&self, id: &ProxyId) -> Result<(), PoolError> {
		let inner = self.inner.read();
		let entry = inner
			.by_id
			.get(id)
			.ok_or_else(|| PoolError::UnknownProxy(id.clone()))?;
		entry.stats.lock().start_request(self.clock.now());
		Ok(())
	}

	/// The only legal path to recording a completed request — strategies
	/// must go through `record_result`, which calls this exactly once, so
	/// double counting (the ambiguity flagged in spec.md §9) cannot happen.
	pub(crate) fn complete_request(
		&self,
		id: &ProxyId,
		success: bool,
		latency_ms: Option<f64>,
	) -> Result<(), PoolError> {
		let inner = self.inner.read();
		let entry = inner
			.by_id
			.get(id)
			.ok_or_else(|| PoolError::UnknownProxy(id.clone()))?;
		entry.stats.lock().complete_request(success, latency_ms);
		Ok(())
	}

	pub fn set_health(&self, id: &ProxyId, status: HealthStatus) -> Result<(), PoolError> {
		let inner = self.inner.read();
		let entry = inner
			.by_id
			.get(id)
			.ok_or_else(|| PoolError::UnknownProxy(id.clone()))?;
		entry.stats.lock().status = status;
		Ok(())
	}

	pub fn set_anonymity(&self, id: &ProxyId, level: AnonymityLevel) -> Result<(), PoolError> {
		let inner = self.inner.read();
		let entry = inner
			.by_id
			.get(id)
			.ok_or_else(|| PoolError::UnknownProxy(id.clone()))?;
		entry.stats.lock().anonymity = level;
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.inner.read().by_id.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn classify_empty_reason(&self, admitted_empty: bool) -> ExhaustedReason {
		if self.is_empty() {
			return ExhaustedReason::Empty;
		}
		let any_healthy = self
			.iter_all()
			.iter()
			.any(|p| p.stats.status == HealthStatus::Healthy);
		if !any_healthy {
			return ExhaustedReason::AllUnhealthy;
		}
		if admitted_empty {
			return ExhaustedReason::BreakersOpen;
		}
		ExhaustedReason::AllExcluded
	}
}

/// Used by tests/doctests that need a concrete `(host, port, scheme)` to
/// build a `ProxyIdentity` without going through full ingestion.
pub fn identity_for(host: &str, port: u16, scheme: Scheme, source_tag: &str) -> ProxyIdentity {
	ProxyIdentity::build(
		host.to_string(),
		port,
		scheme,
		source_tag.to_string(),
		None,
		None,
		Utc::now(),
	)
	.expect("valid test identity")
}

pub type PoolClock = Arc<dyn Clock>;

#[allow(dead_code)]
fn _assert_sync_send<T: Send + Sync>() {}
#[allow(dead_code)]
fn _pool_is_send_sync() {
	_assert_sync_send::<Pool>();
}

pub(crate) fn duration_since(clock: &dyn Clock, earlier: Instant) -> Duration {
	clock.now().saturating_duration_since(earlier)
}

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::clock::Clock;
use crate::proxy::ProxyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
	Closed,
	Open,
	HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
	pub failure_threshold: u32,
	pub rolling_window: Duration,
	pub cooldown: Duration,
	pub exponential_half_open_backoff: bool,
	pub max_cooldown: Duration,
}

impl Default for BreakerConfig {
	fn default() -> Self {
		BreakerConfig {
			failure_threshold: 5,
			rolling_window: Duration::from_secs(60),
			cooldown: Duration::from_secs(30),
			exponential_half_open_backoff: false,
			max_cooldown: Duration::from_secs(300),
		}
	}
}

/// One state machine per proxy (C3). `state.rs`'s record-of-timestamps
/// idea in the teacher crate inspired the deque-of-instants here instead
/// of a per-event heap: entries older than `rolling_window` are pruned on
/// every update, per spec.md §4.3.
struct BreakerState2 {
	state: BreakerState,
	failure_timestamps: VecDeque<Instant>,
	open_until: Option<Instant>,
	last_transition: Instant,
	current_cooldown: Duration,
}

pub struct CircuitBreaker {
	config: BreakerConfig,
	inner: Mutex<BreakerState2>,
}

impl CircuitBreaker {
	fn new(config: BreakerConfig, now: Instant) -> Self {
		CircuitBreaker {
			config,
			inner: Mutex::new(BreakerState2 {
				state: BreakerState::Closed,
				failure_timestamps: VecDeque::new(),
				open_until: None,
				last_transition: now,
				current_cooldown: Duration::ZERO,
			}),
		}
	}

	pub fn state(&self) -> BreakerState {
		self.inner.lock().state
	}

	/// Admission check: CLOSED/HALF_OPEN admit; OPEN lazily attempts the
	/// OPEN -> HALF_OPEN transition once the cooldown has elapsed.
	pub fn allows(&self, now: Instant) -> bool {
		let mut inner = self.inner.lock();
		match inner.state {
			BreakerState::Closed | BreakerState::HalfOpen => true,
			BreakerState::Open => {
				if inner.open_until.map(|until| now >= until).unwrap_or(false) {
					inner.state = BreakerState::HalfOpen;
					inner.last_transition = now;
					true
				} else {
					false
				}
			},
		}
	}

	fn prune(&self, inner: &mut BreakerState2, now: Instant) {
		while let Some(front) = inner.failure_timestamps.front() {
			if now.duration_since(*front) > self.config.rolling_window {
				inner.failure_timestamps.pop_front();
			} else {
				break;
			}
		}
	}

	pub fn record_success(&self, now: Instant) {
		let mut inner = self.inner.lock();
		if inner.state == BreakerState::HalfOpen {
			inner.state = BreakerState::Closed;
			inner.open_until = None;
			inner.failure_timestamps.clear();
			inner.current_cooldown = Duration::ZERO;
			inner.last_transition = now;
		}
	}

	pub fn record_failure(&self, now: Instant) {
		let mut inner = self.inner.lock();
		match inner.state {
			BreakerState::HalfOpen => {
				self.reopen(&mut inner, now);
			},
			BreakerState::Open => {
				// Already open: record into the window but do not restart the
				// cooldown clock (spec.md §4.3 edge case).
				inner.failure_timestamps.push_back(now);
				self.prune(&mut inner, now);
			},
			BreakerState::Closed => {
				inner.failure_timestamps.push_back(now);
				self.prune(&mut inner, now);
				if inner.failure_timestamps.len() as u32 >= self.config.failure_threshold {
					inner.state = BreakerState::Open;
					inner.current_cooldown = self.config.cooldown;
					inner.open_until = Some(now + inner.current_cooldown);
					inner.last_transition = now;
				}
			},
		}
	}

	fn reopen(&self, inner: &mut BreakerState2, now: Instant) {
		inner.state = BreakerState::Open;
		let next_cooldown = if self.config.exponential_half_open_backoff {
			let doubled = inner.current_cooldown.saturating_mul(2);
			if doubled.is_zero() {
				self.config.cooldown
			} else {
				doubled.min(self.config.max_cooldown)
			}
		} else {
			self.config.cooldown
		};
		inner.current_cooldown = next_cooldown;
		inner.open_until = Some(now + next_cooldown);
		inner.last_transition = now;
	}
}

/// Registry of one breaker per proxy, keyed by `proxy_id` (C3). The map is
/// guarded by a lock taken only on create/destroy; steady-state admission
/// checks and failure recording go straight through each breaker's own
/// lock, per spec.md §5.
pub struct CircuitBreakerRegistry {
	breakers: RwLock<HashMap<ProxyId, Arc<CircuitBreaker>>>,
	config: BreakerConfig,
	clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
	pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
		CircuitBreakerRegistry {
			breakers: RwLock::new(HashMap::new()),
			config,
			clock,
		}
	}

	fn get_or_create(&self, id: &ProxyId) -> Arc<CircuitBreaker> {
		if let Some(existing) = self.breakers.read().get(id) {
			return existing.clone();
		}
		let mut guard = self.breakers.write();
		guard
			.entry(id.clone())
			.or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.clone(), self.clock.now())))
			.clone()
	}

	pub fn allows(&self, id: &ProxyId) -> bool {
		self.get_or_create(id).allows(self.clock.now())
	}

	pub fn record_success(&self, id: &ProxyId) {
		self.get_or_create(id).record_success(self.clock.now());
	}

	pub fn record_failure(&self, id: &ProxyId) {
		self.get_or_create(id).record_failure(self.clock.now());
	}

	pub fn state_of(&self, id: &ProxyId) -> Option<BreakerState> {
		self.breakers.read().get(id).map(|b| b.state())
	}

	/// A breaker for a removed proxy is destroyed (spec.md §4.3 edge case).
	pub fn remove(&self, id: &ProxyId) {
		self.breakers.write().remove(id);
	}

	/// Forces a proxy's breaker back to CLOSED, e.g. via an operator-facing
	/// `reset_breaker` API call.
	pub fn reset(&self, id: &ProxyId) {
		self.breakers.write().remove(id);
	}

	pub fn snapshot_states(&self) -> HashMap<ProxyId, BreakerState> {
		self
			.breakers
			.read()
			.iter()
			.map(|(id, b)| (id.clone(), b.state()))
			.collect()
	}
}

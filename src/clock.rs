use std::sync::Arc;
use std::time::{Duration, Instant};

/// Injectable time source so breaker cooldowns, EMA windows, and session
/// TTLs can be advanced deterministically in tests instead of sleeping.
pub trait Clock: Send + Sync {
	fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// A manually-advanced clock for tests. `now()` starts at construction time
/// and only moves forward when `advance` is called, so breaker/window/session
/// tests don't depend on wall-clock sleeps.
pub struct TestClock {
	base: Instant,
	offset: parking_lot::Mutex<Duration>,
}

impl TestClock {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			base: Instant::now(),
			offset: parking_lot::Mutex::new(Duration::ZERO),
		})
	}

	pub fn advance(&self, by: Duration) {
		*self.offset.lock() += by;
	}
}

impl Clock for TestClock {
	fn now(&self) -> Instant {
		self.base + *self.offset.lock()
	}
}

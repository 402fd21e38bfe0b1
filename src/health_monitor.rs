use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::breaker::CircuitBreakerRegistry;
use crate::pool::Pool;
use crate::proxy::{HealthStatus, ProxyId};
use crate::validator::{ValidationOutcome, Validator};

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
	pub check_interval: Duration,
	pub consecutive_failure_threshold: u32,
	pub local_ip: String,
}

impl Default for HealthMonitorConfig {
	fn default() -> Self {
		HealthMonitorConfig {
			check_interval: Duration::from_secs(300),
			consecutive_failure_threshold: 3,
			local_ip: "0.0.0.0".to_string(),
		}
	}
}

/// Periodically re-validates every pool member and updates health state
/// and breaker state accordingly (C7). Started/stopped explicitly by the
/// host; the background task is released deterministically on stop.
pub struct HealthMonitor {
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
	pub fn new() -> Self {
		HealthMonitor {
			handle: Mutex::new(None),
		}
	}

	pub fn start(
		&self,
		pool: Arc<Pool>,
		breakers: Arc<CircuitBreakerRegistry>,
		validator: Arc<Validator>,
		config: HealthMonitorConfig,
	) {
		let mut guard = self.handle.lock();
		if guard.is_some() {
			return;
		}
		let handle = tokio::spawn(async move {
			let mut consecutive_failures: HashMap<ProxyId, u32> = HashMap::new();
			let mut interval = tokio::time::interval(config.check_interval);
			loop {
				interval.tick().await;
				let snapshots = pool.iter_all();
				for snap in snapshots {
					let record = validator.validate_one(&snap.identity, &config.local_ip).await;
					match record.outcome {
						ValidationOutcome::Pass => {
							let _ = pool.complete_request(&snap.identity.id, true, record.latency_ms);
							breakers.record_success(&snap.identity.id);
							consecutive_failures.remove(&snap.identity.id);
							let _ = pool.set_health(&snap.identity.id, HealthStatus::Healthy);
						},
						ValidationOutcome::Fail | ValidationOutcome::Timeout => {
							let _ = pool.complete_request(&snap.identity.id, false, None);
							breakers.record_failure(&snap.identity.id);
							let count = consecutive_failures
								.entry(snap.identity.id.clone())
								.and_modify(|c| *c += 1)
								.or_insert(1);
							if *count >= config.consecutive_failure_threshold {
								let _ = pool.set_health(&snap.identity.id, HealthStatus::Unhealthy);
							}
						},
					}
				}
			}
		});
		*guard = Some(handle);
	}

	/// Cancels the background task; completes within the current tick since
	/// `JoinHandle::abort` interrupts the in-flight validation loop.
	pub fn stop(&self) {
		if let Some(handle) = self.handle.lock().take() {
			handle.abort();
		}
	}

	pub fn is_running(&self) -> bool {
		self.handle.lock().is_some()
	}
}

impl Default for HealthMonitor {
	fn default() -> Self {
		Self::new()
	}
}

impl Drop for HealthMonitor {
	fn drop(&mut self) {
		self.stop();
	}
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clock::Clock;
use crate::proxy::ProxyId;

#[cfg(test)]
use crate::clock::TestClock;

#[derive(Debug, Clone)]
pub struct Session {
	pub session_id: String,
	pub proxy_id: ProxyId,
	pub created_at: Instant,
	pub last_used_at: Instant,
	pub expires_at: Instant,
	pub request_count: u64,
}

/// Sticky `session_id -> proxy_id` bindings with TTL (C5). A single lock
/// over the whole map is sufficient: every operation here is O(1) and
/// brief, matching spec.md §5's guidance for this component.
pub struct SessionManager {
	sessions: RwLock<HashMap<String, Session>>,
	default_ttl: Duration,
	clock: Arc<dyn Clock>,
}

impl SessionManager {
	pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
		SessionManager {
			sessions: RwLock::new(HashMap::new()),
			default_ttl,
			clock,
		}
	}

	pub fn create(&self, session_id: Option<String>, proxy_id: ProxyId, ttl: Option<Duration>) -> Session {
		let now = self.clock.now();
		let ttl = ttl.unwrap_or(self.default_ttl);
		let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
		let session = Session {
			session_id: session_id.clone(),
			proxy_id,
			created_at: now,
			last_used_at: now,
			expires_at: now + ttl,
			request_count: 0,
		};
		self.sessions.write().insert(session_id, session.clone());
		session
	}

	pub fn get(&self, session_id: &str) -> Option<Session> {
		let now = self.clock.now();
		let sessions = self.sessions.read();
		let session = sessions.get(session_id)?;
		if session.expires_at <= now {
			return None;
		}
		Some(session.clone())
	}

	pub fn touch(&self, session_id: &str) {
		let now = self.clock.now();
		if let Some(session) = self.sessions.write().get_mut(session_id) {
			session.last_used_at = now;
			session.request_count += 1;
		}
	}

	/// Re-binds an existing session to a new proxy (used by the session
	/// strategy's fallback path when the bound proxy is no longer admitted).
	pub fn rebind(&self, session_id: &str, proxy_id: ProxyId) {
		let now = self.clock.now();
		let mut sessions = self.sessions.write();
		if let Some(session) = sessions.get_mut(session_id) {
			session.proxy_id = proxy_id;
			session.last_used_at = now;
			session.request_count += 1;
		}
	}

	pub fn close(&self, session_id: &str) {
		self.sessions.write().remove(session_id);
	}

	/// Sessions bound to a removed proxy are closed (spec.md §4.5).
	pub fn close_for_proxy(&self, proxy_id: &ProxyId) {
		self
			.sessions
			.write()
			.retain(|_, session| &session.proxy_id != proxy_id);
	}

	pub fn cleanup_expired(&self) -> usize {
		let now = self.clock.now();
		let mut sessions = self.sessions.write();
		let before = sessions.len();
		sessions.retain(|_, session| session.expires_at > now);
		before - sessions.len()
	}

	pub fn len(&self) -> usize {
		self.sessions.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Background janitor that periodically prunes expired sessions (spec.md
/// §4.5: "a background janitor wakes every 60 s ... and calls
/// `cleanup_expired`"), mirroring `HealthMonitor`'s explicit start/stop
/// lifecycle so the host controls it deterministically rather than it
/// running implicitly from construction.
pub struct SessionJanitor {
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl SessionJanitor {
	pub fn new() -> Self {
		SessionJanitor {
			handle: Mutex::new(None),
		}
	}

	pub fn start(&self, sessions: Arc<SessionManager>, interval: Duration) {
		let mut guard = self.handle.lock();
		if guard.is_some() {
			return;
		}
		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			loop {
				ticker.tick().await;
				let pruned = sessions.cleanup_expired();
				if pruned > 0 {
					tracing::debug!(pruned, "session janitor pruned expired sessions");
				}
			}
		});
		*guard = Some(handle);
	}

	/// Completes within the current tick since `abort` interrupts the
	/// in-flight wait, matching `HealthMonitor::stop`'s contract.
	pub fn stop(&self) {
		if let Some(handle) = self.handle.lock().take() {
			handle.abort();
		}
	}

	pub fn is_running(&self) -> bool {
		self.handle.lock().is_some()
	}
}

impl Default for SessionJanitor {
	fn default() -> Self {
		Self::new()
	}
}

impl Drop for SessionJanitor {
	fn drop(&mut self) {
		self.stop();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::SystemClock;
	use crate::proxy::ProxyId;

	fn proxy(host: &str) -> ProxyId {
		ProxyId::new(host, 8080, crate::proxy::Scheme::Http)
	}

	#[test]
	fn create_get_touch_round_trip() {
		let manager = SessionManager::new(Duration::from_secs(600), Arc::new(SystemClock));
		let session = manager.create(Some("s1".to_string()), proxy("10.0.0.1"), None);
		assert_eq!(session.request_count, 0);

		manager.touch("s1");
		let fetched = manager.get("s1").expect("session present");
		assert_eq!(fetched.request_count, 1);
		assert_eq!(fetched.proxy_id, proxy("10.0.0.1"));
	}

	#[test]
	fn close_for_proxy_removes_bound_sessions_only() {
		let manager = SessionManager::new(Duration::from_secs(600), Arc::new(SystemClock));
		manager.create(Some("s1".to_string()), proxy("10.0.0.1"), None);
		manager.create(Some("s2".to_string()), proxy("10.0.0.2"), None);

		manager.close_for_proxy(&proxy("10.0.0.1"));

		assert!(manager.get("s1").is_none());
		assert!(manager.get("s2").is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn janitor_prunes_expired_sessions_on_its_own() {
		let clock = TestClock::new();
		let manager = Arc::new(SessionManager::new(Duration::from_millis(50), clock.clone()));
		manager.create(Some("short-lived".to_string()), proxy("10.0.0.1"), None);
		assert_eq!(manager.len(), 1);

		let janitor = SessionJanitor::new();
		janitor.start(manager.clone(), Duration::from_millis(10));
		assert!(janitor.is_running());

		clock.advance(Duration::from_millis(100));
		tokio::time::advance(Duration::from_millis(100)).await;
		tokio::task::yield_now().await;

		assert_eq!(manager.len(), 0);
		janitor.stop();
		assert!(!janitor.is_running());
	}
}

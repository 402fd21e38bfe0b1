use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::PoolError;
use crate::proxy::{ProxyId, ProxySnapshot};
use crate::session::SessionManager;

use super::{RotationStrategy, SelectionContext};

/// Deterministic round-robin over the admitted candidate set. The index
/// advances on every `pick` and is taken modulo the *current* candidate
/// count, so a pool mutation between calls cannot panic or skip — it just
/// reshuffles which physical proxy index N lands on, which is the
/// "wraps safely" behavior spec.md §4.4 asks for.
pub struct RoundRobin {
	index: AtomicU64,
}

impl RoundRobin {
	pub fn new() -> Self {
		RoundRobin {
			index: AtomicU64::new(0),
		}
	}
}

impl Default for RoundRobin {
	fn default() -> Self {
		Self::new()
	}
}

impl RotationStrategy for RoundRobin {
	fn pick(
		&self,
		candidates: &[ProxySnapshot],
		_sessions: &SessionManager,
		_ctx: &SelectionContext,
	) -> Result<ProxyId, PoolError> {
		let n = candidates.len() as u64;
		let i = self.index.fetch_add(1, Ordering::Relaxed) % n;
		Ok(candidates[i as usize].id().clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::proxy::{ProxyStats, Scheme};
	use chrono::Utc;
	use std::time::{Duration, Instant};

	fn snap(host: &str) -> ProxySnapshot {
		let identity =
			crate::proxy::ProxyIdentity::build(host.to_string(), 8080, Scheme::Http, "t".into(), None, None, Utc::now())
				.unwrap();
		let stats = ProxyStats::new(Instant::now(), Duration::from_secs(3600), 0.2, Utc::now());
		ProxySnapshot { identity, stats }
	}

	#[test]
	fn cycles_deterministically() {
		let strategy = RoundRobin::new();
		let candidates = vec![snap("a"), snap("b"), snap("c")];
		let sessions = SessionManager::new(Duration::from_secs(1800), std::sync::Arc::new(crate::clock::SystemClock));
		let ctx = SelectionContext::default();
		let picks: Vec<String> = (0..6)
			.map(|_| {
				strategy
					.pick(&candidates, &sessions, &ctx)
					.unwrap()
					.as_str()
					.to_string()
			})
			.collect();
		let expected: Vec<String> = [0, 1, 2, 0, 1, 2]
			.iter()
			.map(|&i| candidates[i].id().as_str().to_string())
			.collect();
		assert_eq!(picks, expected);
	}
}

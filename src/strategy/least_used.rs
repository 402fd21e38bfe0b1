use crate::error::PoolError;
use crate::proxy::{ProxyId, ProxySnapshot};
use crate::session::SessionManager;

use super::{RotationStrategy, SelectionContext};

/// Argmin of `requests_started` among admitted candidates, tie-broken by
/// lowest proxy id (spec.md §4.4).
pub struct LeastUsed;

impl LeastUsed {
	pub fn new() -> Self {
		LeastUsed
	}
}

impl Default for LeastUsed {
	fn default() -> Self {
		Self::new()
	}
}

impl RotationStrategy for LeastUsed {
	fn pick(
		&self,
		candidates: &[ProxySnapshot],
		_sessions: &SessionManager,
		_ctx: &SelectionContext,
	) -> Result<ProxyId, PoolError> {
		let chosen = candidates
			.iter()
			.min_by(|a, b| {
				a.stats
					.requests_started
					.cmp(&b.stats.requests_started)
					.then_with(|| a.id().as_str().cmp(b.id().as_str()))
			})
			.expect("non-empty candidates");
		Ok(chosen.id().clone())
	}
}

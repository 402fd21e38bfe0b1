use rand::Rng;

use crate::error::PoolError;
use crate::proxy::{ProxyId, ProxySnapshot};
use crate::session::SessionManager;

use super::{RotationStrategy, SelectionContext};

/// Uniform-random selection from the admitted set. Consecutive duplicates
/// are permitted, per spec.md §4.4.
pub struct Random;

impl Random {
	pub fn new() -> Self {
		Random
	}
}

impl Default for Random {
	fn default() -> Self {
		Self::new()
	}
}

impl RotationStrategy for Random {
	fn pick(
		&self,
		candidates: &[ProxySnapshot],
		_sessions: &SessionManager,
		_ctx: &SelectionContext,
	) -> Result<ProxyId, PoolError> {
		let i = rand::thread_rng().gen_range(0..candidates.len());
		Ok(candidates[i].id().clone())
	}
}

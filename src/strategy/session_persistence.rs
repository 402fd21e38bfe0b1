use std::sync::Arc;

use crate::error::PoolError;
use crate::proxy::{ProxyId, ProxySnapshot};
use crate::session::SessionManager;

use super::{RotationStrategy, SelectionContext};

/// Sticky `session_id -> proxy_id` selection. If the context carries a
/// known, still-admitted binding, returns it; otherwise rebinds (or binds
/// for the first time) via the fallback strategy, defaulting to
/// round-robin (spec.md §4.4).
pub struct SessionPersistence {
	fallback: Arc<dyn RotationStrategy>,
}

impl SessionPersistence {
	pub fn new(fallback: Arc<dyn RotationStrategy>) -> Self {
		SessionPersistence { fallback }
	}
}

impl RotationStrategy for SessionPersistence {
	fn pick(
		&self,
		candidates: &[ProxySnapshot],
		sessions: &SessionManager,
		ctx: &SelectionContext,
	) -> Result<ProxyId, PoolError> {
		let Some(session_id) = ctx.session_id.as_ref() else {
			return self.fallback.pick(candidates, sessions, ctx);
		};

		if let Some(session) = sessions.get(session_id) {
			if candidates.iter().any(|p| p.id() == &session.proxy_id) {
				sessions.touch(session_id);
				return Ok(session.proxy_id);
			}
			let chosen = self.fallback.pick(candidates, sessions, ctx)?;
			sessions.rebind(session_id, chosen.clone());
			return Ok(chosen);
		}

		let chosen = self.fallback.pick(candidates, sessions, ctx)?;
		sessions.create(Some(session_id.clone()), chosen.clone(), None);
		Ok(chosen)
	}
}

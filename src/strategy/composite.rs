use std::sync::Arc;

use crate::error::{ExhaustedReason, PoolError};
use crate::proxy::{ProxyId, ProxySnapshot};
use crate::session::SessionManager;

use super::{RotationStrategy, SelectionContext};

/// A single stage of a composite filter chain: `set -> set`.
pub trait Filter: Send + Sync {
	fn apply(&self, candidates: Vec<ProxySnapshot>, ctx: &SelectionContext) -> Vec<ProxySnapshot>;
}

/// Ordered filter chain followed by exactly one selector (spec.md §4.4).
/// If the filter chain empties the candidate set, fails with
/// `ExhaustedPool{filters}` unless a fallback selector is configured, in
/// which case the fallback runs against the *pre-filter* candidate set.
pub struct Composite {
	filters: Vec<Box<dyn Filter>>,
	selector: Arc<dyn RotationStrategy>,
	fallback: Option<Arc<dyn RotationStrategy>>,
}

impl Composite {
	pub fn new(
		filters: Vec<Box<dyn Filter>>,
		selector: Arc<dyn RotationStrategy>,
		fallback: Option<Arc<dyn RotationStrategy>>,
	) -> Self {
		Composite {
			filters,
			selector,
			fallback,
		}
	}
}

impl RotationStrategy for Composite {
	fn pick(
		&self,
		candidates: &[ProxySnapshot],
		sessions: &SessionManager,
		ctx: &SelectionContext,
	) -> Result<ProxyId, PoolError> {
		let mut filtered = candidates.to_vec();
		for filter in &self.filters {
			filtered = filter.apply(filtered, ctx);
			if filtered.is_empty() {
				break;
			}
		}

		if filtered.is_empty() {
			return match &self.fallback {
				Some(fallback) => fallback.pick(candidates, sessions, ctx),
				None => Err(PoolError::ExhaustedPool(ExhaustedReason::Filters)),
			};
		}

		self.selector.pick(&filtered, sessions, ctx)
	}
}

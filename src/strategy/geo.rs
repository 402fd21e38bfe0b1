use std::sync::Arc;

use crate::error::{ExhaustedReason, PoolError};
use crate::proxy::{ProxyId, ProxySnapshot};
use crate::session::SessionManager;

use super::{RotationStrategy, SelectionContext};

/// Filters the admitted set by `ctx.target_country` (preferred) or
/// `ctx.target_region`, then applies a secondary strategy to whatever
/// remains. Falls back to the full admitted set if the geo filter empties
/// it and `geo_fallback_enabled` is set; otherwise fails with
/// `ExhaustedPool{filters}` (spec.md §4.4).
pub struct GeoTargeted {
	geo_fallback_enabled: bool,
	secondary: Arc<dyn RotationStrategy>,
}

impl GeoTargeted {
	pub fn new(geo_fallback_enabled: bool, secondary: Arc<dyn RotationStrategy>) -> Self {
		GeoTargeted {
			geo_fallback_enabled,
			secondary,
		}
	}
}

impl RotationStrategy for GeoTargeted {
	fn pick(
		&self,
		candidates: &[ProxySnapshot],
		sessions: &SessionManager,
		ctx: &SelectionContext,
	) -> Result<ProxyId, PoolError> {
		let filtered: Vec<ProxySnapshot> = if let Some(country) = &ctx.target_country {
			candidates
				.iter()
				.filter(|p| p.identity.country_code.as_deref() == Some(country.as_str()))
				.cloned()
				.collect()
		} else if let Some(region) = &ctx.target_region {
			candidates
				.iter()
				.filter(|p| p.identity.region.as_deref() == Some(region.as_str()))
				.cloned()
				.collect()
		} else {
			candidates.to_vec()
		};

		if filtered.is_empty() {
			if self.geo_fallback_enabled {
				return self.secondary.pick(candidates, sessions, ctx);
			}
			return Err(PoolError::ExhaustedPool(ExhaustedReason::Filters));
		}

		self.secondary.pick(&filtered, sessions, ctx)
	}
}

use rand::Rng;

use crate::error::PoolError;
use crate::proxy::{ProxyId, ProxySnapshot};
use crate::session::SessionManager;

use super::{build, RotationStrategy, SelectionContext, StrategyConfig};

/// Weighted random with weight proportional to `1 / ema_latency_ms`:
/// proxies that answer faster get picked more often. Proxies lacking an
/// EMA sample are excluded outright; if that leaves nothing, falls back to
/// a configured fallback strategy, or fails with `MissingMetadata`
/// (spec.md §4.4).
pub struct PerformanceBased {
	fallback_name: Option<String>,
}

impl PerformanceBased {
	pub fn new(fallback_name: Option<String>) -> Self {
		PerformanceBased { fallback_name }
	}
}

impl RotationStrategy for PerformanceBased {
	fn pick(
		&self,
		candidates: &[ProxySnapshot],
		sessions: &SessionManager,
		ctx: &SelectionContext,
	) -> Result<ProxyId, PoolError> {
		let timed: Vec<(&ProxySnapshot, f64)> = candidates
			.iter()
			.filter_map(|p| p.stats.ema_latency_ms.map(|l| (p, l)))
			.filter(|(_, l)| *l > 0.0)
			.collect();

		if timed.is_empty() {
			return match &self.fallback_name {
				Some(name) => {
					let fallback = build(name, &StrategyConfig::default())?;
					fallback.pick(candidates, sessions, ctx)
				},
				None => Err(PoolError::MissingMetadata {
					fields: vec!["ema_latency_ms"],
				}),
			};
		}

		let weights: Vec<f64> = timed.iter().map(|(_, l)| 1.0 / l).collect();
		let total: f64 = weights.iter().sum();
		let mut roll = rand::thread_rng().gen_range(0.0..total);
		for ((p, _), w) in timed.iter().zip(weights.iter()) {
			if roll < *w {
				return Ok(p.id().clone());
			}
			roll -= *w;
		}
		Ok(timed.last().expect("non-empty").0.id().clone())
	}

	fn declared_metadata(&self) -> &'static [&'static str] {
		&["ema_latency_ms"]
	}
}

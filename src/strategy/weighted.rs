use std::collections::HashMap;

use rand::Rng;

use crate::error::PoolError;
use crate::proxy::{ProxyId, ProxySnapshot};
use crate::session::SessionManager;

use super::{RotationStrategy, SelectionContext};

/// Weighted random selection. Uses the configured `weights` map when
/// present, falling back to each candidate's observed success rate
/// (`successes / max(1, requests_completed)`) otherwise. Proxies with a
/// zero or negative weight are skipped; if every candidate ends up with
/// zero weight, falls back to uniform random (spec.md §4.4).
pub struct Weighted {
	weights: Option<HashMap<ProxyId, f64>>,
}

impl Weighted {
	pub fn new(weights: Option<HashMap<ProxyId, f64>>) -> Self {
		Weighted { weights }
	}

	fn weight_of(&self, p: &ProxySnapshot) -> f64 {
		if let Some(weights) = &self.weights {
			if let Some(&w) = weights.get(p.id()) {
				return w;
			}
		}
		let completed = p.stats.requests_completed.max(1) as f64;
		p.stats.successes as f64 / completed
	}
}

impl RotationStrategy for Weighted {
	fn pick(
		&self,
		candidates: &[ProxySnapshot],
		_sessions: &SessionManager,
		_ctx: &SelectionContext,
	) -> Result<ProxyId, PoolError> {
		let weights: Vec<f64> = candidates
			.iter()
			.map(|p| self.weight_of(p))
			.map(|w| if w > 0.0 { w } else { 0.0 })
			.collect();
		let total: f64 = weights.iter().sum();
		if total <= 0.0 {
			let i = rand::thread_rng().gen_range(0..candidates.len());
			return Ok(candidates[i].id().clone());
		}
		let mut roll = rand::thread_rng().gen_range(0.0..total);
		for (p, w) in candidates.iter().zip(weights.iter()) {
			if roll < *w {
				return Ok(p.id().clone());
			}
			roll -= *w;
		}
		Ok(candidates.last().expect("non-empty candidates").id().clone())
	}
}

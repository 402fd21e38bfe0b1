use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::PoolError;
use crate::proxy::ProxyId;
use crate::strategy::{SelectionContext, StrategyEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
	Exponential,
	Linear,
	Fixed,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub backoff: BackoffKind,
	pub base_delay: Duration,
	pub multiplier: f64,
	pub max_backoff: Duration,
	pub jitter: bool,
	pub retry_status_codes: HashSet<u16>,
	pub total_timeout: Option<Duration>,
	pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		RetryPolicy {
			max_attempts: 3,
			backoff: BackoffKind::Exponential,
			base_delay: Duration::from_secs(1),
			multiplier: 2.0,
			max_backoff: Duration::from_secs(30),
			jitter: false,
			retry_status_codes: [502u16, 503, 504].into_iter().collect(),
			total_timeout: None,
			retry_non_idempotent: false,
		}
	}
}

impl RetryPolicy {
	/// Backoff computation per spec.md §4.6. `attempt` is zero-based (the
	/// delay *before* the next, i.e. `attempt+1`-th, attempt).
	pub fn backoff_for(&self, attempt: u32) -> Duration {
		let base = match self.backoff {
			BackoffKind::Exponential => {
				let factor = self.multiplier.powi(attempt as i32);
				self.base_delay.mul_f64(factor).min(self.max_backoff)
			},
			BackoffKind::Linear => self
				.base_delay
				.mul_f64((attempt + 1) as f64)
				.min(self.max_backoff),
			BackoffKind::Fixed => self.base_delay,
		};
		if self.jitter {
			let factor = rand::thread_rng().gen_range(0.5..1.5);
			base.mul_f64(factor)
		} else {
			base
		}
	}
}

/// The outcome an operation reports back to the retry executor.
#[derive(Debug, Clone)]
pub enum Outcome {
	Success { latency_ms: f64 },
	Timeout,
	NetworkError,
	HttpStatus { code: u16, latency_ms: f64 },
}

impl Outcome {
	fn latency_ms(&self) -> Option<f64> {
		match self {
			Outcome::Success { latency_ms } | Outcome::HttpStatus { latency_ms, .. } => Some(*latency_ms),
			_ => None,
		}
	}

	fn is_success(&self) -> bool {
		matches!(self, Outcome::Success { .. })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
	Get,
	Head,
	Options,
	Post,
	Put,
	Patch,
	Delete,
}

impl HttpMethod {
	fn is_idempotent(self) -> bool {
		!matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch | HttpMethod::Delete)
	}
}

#[derive(Debug, Clone)]
pub struct RetryAttempt {
	pub attempt: u32,
	pub proxy_id: ProxyId,
	pub outcome_kind: &'static str,
	pub latency_ms: Option<f64>,
	pub delay_before: Duration,
}

fn is_retryable(outcome: &Outcome, policy: &RetryPolicy) -> bool {
	match outcome {
		Outcome::Success { .. } => false,
		Outcome::Timeout | Outcome::NetworkError => true,
		Outcome::HttpStatus { code, .. } => policy.retry_status_codes.contains(code) || *code == 429,
	}
}

/// Orchestrates "select -> attempt -> on failure: back off, exclude,
/// re-select" (C6). Generic over the caller's actual I/O so the core never
/// forwards HTTP itself, per spec.md §1's non-goal.
pub struct RetryExecutor<'a> {
	engine: &'a StrategyEngine,
	policy: RetryPolicy,
}

impl<'a> RetryExecutor<'a> {
	pub fn new(engine: &'a StrategyEngine, policy: RetryPolicy) -> Self {
		RetryExecutor { engine, policy }
	}

	/// Runs `op` against a sequence of selected proxies until it succeeds,
	/// the retry budget is exhausted, or the pool has nothing left to
	/// offer. `op` performs the actual outbound call and classifies its own
	/// result into an `Outcome`.
	pub async fn execute<F, Fut>(
		&self,
		base_ctx: SelectionContext,
		method: HttpMethod,
		mut op: F,
	) -> Result<(Outcome, Vec<RetryAttempt>), PoolError>
	where
		F: FnMut(ProxyId) -> Fut,
		Fut: Future<Output = Outcome>,
	{
		let started = Instant::now();
		let mut ctx = base_ctx;
		let mut attempts = Vec::new();

		for attempt in 0..self.policy.max_attempts {
			let chosen = match self.engine.select(&ctx) {
				Ok(id) => id,
				Err(PoolError::ExhaustedPool(crate::error::ExhaustedReason::BreakersOpen)) => {
					return Err(PoolError::ServiceUnavailable);
				},
				Err(other) => return Err(other),
			};
			let outcome = op(chosen.clone()).await;
			let success = outcome.is_success();
			self
				.engine
				.record_result(&chosen, success, outcome.latency_ms());

			if success {
				attempts.push(RetryAttempt {
					attempt,
					proxy_id: chosen,
					outcome_kind: "success",
					latency_ms: outcome.latency_ms(),
					delay_before: Duration::ZERO,
				});
				return Ok((outcome, attempts));
			}

			let retryable = is_retryable(&outcome, &self.policy)
				&& (method.is_idempotent() || self.policy.retry_non_idempotent);

			ctx.excluded_proxy_ids.insert(chosen.clone());

			if !retryable || attempt + 1 >= self.policy.max_attempts {
				attempts.push(RetryAttempt {
					attempt,
					proxy_id: chosen,
					outcome_kind: "terminal",
					latency_ms: outcome.latency_ms(),
					delay_before: Duration::ZERO,
				});
				return Ok((outcome, attempts));
			}

			let delay = self.policy.backoff_for(attempt);
			if let Some(total_timeout) = self.policy.total_timeout {
				if started.elapsed() + delay > total_timeout {
					attempts.push(RetryAttempt {
						attempt,
						proxy_id: chosen,
						outcome_kind: "budget_exceeded",
						latency_ms: outcome.latency_ms(),
						delay_before: delay,
					});
					return Err(PoolError::BudgetExceeded);
				}
			}

			attempts.push(RetryAttempt {
				attempt,
				proxy_id: chosen,
				outcome_kind: "retry",
				latency_ms: outcome.latency_ms(),
				delay_before: delay,
			});
			tokio::time::sleep(delay).await;
		}

		Err(PoolError::ExhaustedPool(
			crate::error::ExhaustedReason::AllExcluded,
		))
	}
}

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PoolError, ValidationStage};

/// Stable identity for a proxy, derived from `(host, port, scheme)`. Cheap
/// to clone and hash; used everywhere else in the crate as an opaque
/// back-reference instead of sharing `Proxy` ownership (see `Pool`).
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ProxyId(Arc<str>);

impl ProxyId {
	pub fn new(host: &str, port: u16, scheme: Scheme) -> Self {
		ProxyId(Arc::from(format!("{scheme}://{host}:{port}").as_str()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for ProxyId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Display for ProxyId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
	Http,
	Https,
	Socks4,
	Socks5,
}

impl fmt::Display for Scheme {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Scheme::Http => "http",
			Scheme::Https => "https",
			Scheme::Socks4 => "socks4",
			Scheme::Socks5 => "socks5",
		};
		f.write_str(s)
	}
}

impl FromStr for Scheme {
	type Err = PoolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"http" => Ok(Scheme::Http),
			"https" => Ok(Scheme::Https),
			"socks4" => Ok(Scheme::Socks4),
			"socks5" => Ok(Scheme::Socks5),
			_ => Err(PoolError::ValidationFailed {
				stage: ValidationStage::Format,
				reason: format!("unsupported scheme: {s}"),
			}),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
	Unknown,
	Healthy,
	Degraded,
	Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnonymityLevel {
	Unknown,
	Transparent,
	Anonymous,
	Elite,
}

/// A secret credential that never prints itself. `Debug`/`Display` always
/// redact to `***`; only `expose()` yields the real value, for callers that
/// actually dial the proxy.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret(String);

impl Secret {
	pub fn new(value: impl Into<String>) -> Self {
		Secret(value.into())
	}

	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for Secret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("***")
	}
}

impl fmt::Display for Secret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("***")
	}
}

/// Host:port:scheme plus credentials and geo/provenance — the
/// construction-time-validated identity half of a proxy. Immutable once
/// built; mutable health/stats live in `ProxyStats`.
#[derive(Debug, Clone)]
pub struct ProxyIdentity {
	pub id: ProxyId,
	pub host: String,
	pub port: u16,
	pub scheme: Scheme,
	pub username: Option<String>,
	pub secret: Option<Secret>,
	pub country_code: Option<String>,
	pub region: Option<String>,
	pub source_tag: String,
	pub first_seen: DateTime<Utc>,
}

impl ProxyIdentity {
	/// Construction-time validation/normalization, replacing the "pydantic
	/// coercion validator" pattern named in the design notes: country codes
	/// are upper-cased, ports are range-checked, schemes are parsed.
	pub fn build(
		host: String,
		port: u16,
		scheme: Scheme,
		source_tag: String,
		country_code: Option<String>,
		region: Option<String>,
		now: DateTime<Utc>,
	) -> Result<Self, PoolError> {
		if host.trim().is_empty() {
			return Err(PoolError::ValidationFailed {
				stage: ValidationStage::Format,
				reason: "empty host".to_string(),
			});
		}
		if port == 0 {
			return Err(PoolError::ValidationFailed {
				stage: ValidationStage::Format,
				reason: "port must be in [1,65535]".to_string(),
			});
		}
		let country_code = country_code.map(|c| c.to_ascii_uppercase());
		let id = ProxyId::new(&host, port, scheme);
		Ok(ProxyIdentity {
			id,
			host,
			port,
			scheme,
			username: None,
			secret: None,
			country_code,
			region,
			source_tag,
			first_seen: now,
		})
	}
}

/// Fixed-size ring of one-minute buckets implementing the sliding request
/// window from spec.md §3/§9: O(1) amortized updates, bounded memory, lazy
/// pruning instead of a naive dict-of-timestamps.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
	pub started_at: Instant,
	pub duration: Duration,
	buckets: VecDeque<(Instant, u64)>,
	bucket_width: Duration,
}

impl SlidingWindow {
	pub fn new(now: Instant, duration: Duration) -> Self {
		SlidingWindow {
			started_at: now,
			duration,
			buckets: VecDeque::new(),
			bucket_width: Duration::from_secs(60),
		}
	}

	/// Lazily resets the window if its configured duration has elapsed.
	pub fn maybe_reset(&mut self, now: Instant) {
		if now.duration_since(self.started_at) > self.duration {
			self.started_at = now;
			self.buckets.clear();
		}
	}

	pub fn record(&mut self, now: Instant) {
		self.maybe_reset(now);
		self.prune(now);
		let bucket_start = self.bucket_floor(now);
		if let Some(last) = self.buckets.back_mut() {
			if last.0 == bucket_start {
				last.1 += 1;
				return;
			}
		}
		self.buckets.push_back((bucket_start, 1));
	}

	pub fn count(&self, now: Instant) -> u64 {
		self.buckets
			.iter()
			.filter(|(t, _)| now.duration_since(*t) <= self.duration)
			.map(|(_, c)| *c)
			.sum()
	}

	fn prune(&mut self, now: Instant) {
		while let Some((t, _)) = self.buckets.front() {
			if now.duration_since(*t) > self.duration {
				self.buckets.pop_front();
			} else {
				break;
			}
		}
	}

	fn bucket_floor(&self, now: Instant) -> Instant {
		let elapsed = now.duration_since(self.started_at);
		let width = self.bucket_width.as_secs().max(1);
		let buckets_elapsed = elapsed.as_secs() / width;
		self.started_at + Duration::from_secs(buckets_elapsed * width)
	}
}

/// Mutable per-proxy counters, EMA latency, and sliding window — guarded by
/// its own lock in `Pool` so stat updates never contend with structural
/// pool mutations.
#[derive(Debug, Clone)]
pub struct ProxyStats {
	pub status: HealthStatus,
	pub anonymity: AnonymityLevel,
	pub requests_started: u64,
	pub requests_completed: u64,
	pub requests_active: u64,
	pub successes: u64,
	pub failures: u64,
	pub ema_latency_ms: Option<f64>,
	pub ema_alpha: f64,
	pub window: SlidingWindow,
	pub weight: Option<f64>,
	pub last_seen: DateTime<Utc>,
}

impl ProxyStats {
	pub fn new(now: Instant, window_duration: Duration, ema_alpha: f64, seen: DateTime<Utc>) -> Self {
		ProxyStats {
			status: HealthStatus::Unknown,
			anonymity: AnonymityLevel::Unknown,
			requests_started: 0,
			requests_completed: 0,
			requests_active: 0,
			successes: 0,
			failures: 0,
			ema_latency_ms: None,
			ema_alpha,
			window: SlidingWindow::new(now, window_duration),
			weight: None,
			last_seen: seen,
		}
	}

	pub fn success_rate(&self) -> f64 {
		if self.requests_completed == 0 {
			return 0.0;
		}
		self.successes as f64 / self.requests_completed as f64
	}

	pub(crate) fn start_request(&mut self, now: Instant) {
		self.window.maybe_reset(now);
		self.requests_started += 1;
		self.requests_active += 1;
		self.window.record(now);
	}

	pub(crate) fn complete_request(&mut self, success: bool, latency_ms: Option<f64>) {
		self.requests_completed += 1;
		self.requests_active = self.requests_active.saturating_sub(1);
		if success {
			self.successes += 1;
		} else {
			self.failures += 1;
		}
		if let Some(latency) = latency_ms {
			self.ema_latency_ms = Some(match self.ema_latency_ms {
				Some(prev) => self.ema_alpha * latency + (1.0 - self.ema_alpha) * prev,
				None => latency,
			});
		}
	}
}

/// An immutable, point-in-time view of one proxy for strategy computation,
/// copied out of the pool so strategies never hold pool locks while
/// selecting (spec.md §4.1 contract).
#[derive(Debug, Clone)]
pub struct ProxySnapshot {
	pub identity: ProxyIdentity,
	pub stats: ProxyStats,
}

impl ProxySnapshot {
	pub fn id(&self) -> &ProxyId {
		&self.identity.id
	}
}

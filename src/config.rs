use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::breaker::BreakerConfig;
use crate::error::PoolError;
use crate::health_monitor::HealthMonitorConfig;
use crate::retry::{BackoffKind, RetryPolicy};
use crate::validator::{ValidationLevel, ValidatorConfig};

fn default_ema_alpha() -> f64 {
	0.2
}

fn default_window_secs() -> u64 {
	3600
}

fn default_session_ttl_secs() -> u64 {
	1800
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
	pub ema_alpha: f64,
	pub window_secs: u64,
}

impl Default for PoolSettings {
	fn default() -> Self {
		PoolSettings {
			ema_alpha: default_ema_alpha(),
			window_secs: default_window_secs(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
	pub default_strategy: String,
	pub session_ttl_secs: u64,
	pub preferred_countries: Vec<String>,
	pub geo_fallback_enabled: bool,
}

impl Default for StrategySettings {
	fn default() -> Self {
		StrategySettings {
			default_strategy: "round_robin".to_string(),
			session_ttl_secs: default_session_ttl_secs(),
			preferred_countries: Vec::new(),
			geo_fallback_enabled: true,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
	pub failure_threshold: u32,
	pub rolling_window_secs: u64,
	pub cooldown_secs: u64,
	pub exponential_half_open_backoff: bool,
	pub max_cooldown_secs: u64,
}

impl Default for BreakerSettings {
	fn default() -> Self {
		let defaults = BreakerConfig::default();
		BreakerSettings {
			failure_threshold: defaults.failure_threshold,
			rolling_window_secs: defaults.rolling_window.as_secs(),
			cooldown_secs: defaults.cooldown.as_secs(),
			exponential_half_open_backoff: defaults.exponential_half_open_backoff,
			max_cooldown_secs: defaults.max_cooldown.as_secs(),
		}
	}
}

impl BreakerSettings {
	pub fn to_breaker_config(&self) -> BreakerConfig {
		BreakerConfig {
			failure_threshold: self.failure_threshold,
			rolling_window: Duration::from_secs(self.rolling_window_secs),
			cooldown: Duration::from_secs(self.cooldown_secs),
			exponential_half_open_backoff: self.exponential_half_open_backoff,
			max_cooldown: Duration::from_secs(self.max_cooldown_secs),
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKindSetting {
	Exponential,
	Linear,
	Fixed,
}

impl From<BackoffKindSetting> for BackoffKind {
	fn from(value: BackoffKindSetting) -> Self {
		match value {
			BackoffKindSetting::Exponential => BackoffKind::Exponential,
			BackoffKindSetting::Linear => BackoffKind::Linear,
			BackoffKindSetting::Fixed => BackoffKind::Fixed,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
	pub max_attempts: u32,
	pub backoff: BackoffKindSetting,
	pub base_delay_ms: u64,
	pub multiplier: f64,
	pub max_backoff_ms: u64,
	pub jitter: bool,
	pub retry_status_codes: Vec<u16>,
	pub total_timeout_ms: Option<u64>,
	pub retry_non_idempotent: bool,
}

impl Default for RetrySettings {
	fn default() -> Self {
		let defaults = RetryPolicy::default();
		RetrySettings {
			max_attempts: defaults.max_attempts,
			backoff: BackoffKindSetting::Exponential,
			base_delay_ms: defaults.base_delay.as_millis() as u64,
			multiplier: defaults.multiplier,
			max_backoff_ms: defaults.max_backoff.as_millis() as u64,
			jitter: defaults.jitter,
			retry_status_codes: defaults.retry_status_codes.into_iter().collect(),
			total_timeout_ms: None,
			retry_non_idempotent: defaults.retry_non_idempotent,
		}
	}
}

impl RetrySettings {
	pub fn to_retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_attempts: self.max_attempts,
			backoff: self.backoff.into(),
			base_delay: Duration::from_millis(self.base_delay_ms),
			multiplier: self.multiplier,
			max_backoff: Duration::from_millis(self.max_backoff_ms),
			jitter: self.jitter,
			retry_status_codes: self.retry_status_codes.iter().copied().collect(),
			total_timeout: self.total_timeout_ms.map(Duration::from_millis),
			retry_non_idempotent: self.retry_non_idempotent,
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevelSetting {
	Basic,
	Standard,
	Full,
}

impl From<ValidationLevelSetting> for ValidationLevel {
	fn from(value: ValidationLevelSetting) -> Self {
		match value {
			ValidationLevelSetting::Basic => ValidationLevel::Basic,
			ValidationLevelSetting::Standard => ValidationLevel::Standard,
			ValidationLevelSetting::Full => ValidationLevel::Full,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
	pub level: ValidationLevelSetting,
	pub timeout_ms: u64,
	pub max_concurrency: usize,
	pub echo_endpoints: Vec<String>,
}

impl Default for ValidationSettings {
	fn default() -> Self {
		let defaults = ValidatorConfig::default();
		ValidationSettings {
			level: ValidationLevelSetting::Standard,
			timeout_ms: defaults.timeout.as_millis() as u64,
			max_concurrency: defaults.max_concurrency,
			echo_endpoints: defaults.echo_endpoints,
		}
	}
}

impl ValidationSettings {
	pub fn to_validator_config(&self) -> ValidatorConfig {
		ValidatorConfig {
			level: self.level.into(),
			timeout: Duration::from_millis(self.timeout_ms),
			max_concurrency: self.max_concurrency,
			echo_endpoints: self.echo_endpoints.clone(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
	pub check_interval_secs: u64,
	pub consecutive_failure_threshold: u32,
	pub local_ip: String,
}

impl Default for HealthSettings {
	fn default() -> Self {
		let defaults = HealthMonitorConfig::default();
		HealthSettings {
			check_interval_secs: defaults.check_interval.as_secs(),
			consecutive_failure_threshold: defaults.consecutive_failure_threshold,
			local_ip: defaults.local_ip,
		}
	}
}

impl HealthSettings {
	pub fn to_health_monitor_config(&self) -> HealthMonitorConfig {
		HealthMonitorConfig {
			check_interval: Duration::from_secs(self.check_interval_secs),
			consecutive_failure_threshold: self.consecutive_failure_threshold,
			local_ip: self.local_ip.clone(),
		}
	}
}

fn default_janitor_interval_secs() -> u64 {
	60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
	pub ttl_secs: u64,
	pub janitor_interval_secs: u64,
}

impl Default for SessionSettings {
	fn default() -> Self {
		SessionSettings {
			ttl_secs: default_session_ttl_secs(),
			janitor_interval_secs: default_janitor_interval_secs(),
		}
	}
}

/// Top-level deserializable configuration covering every knob named in
/// the pool's public surface: pool/EMA, strategy defaults, breaker,
/// retry, validation, health monitor, and session settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
	pub pool: PoolSettings,
	pub strategy: StrategySettings,
	pub breaker: BreakerSettings,
	pub retry: RetrySettings,
	pub validation: ValidationSettings,
	pub health: HealthSettings,
	pub session: SessionSettings,
}

impl Config {
	pub fn from_toml_str(raw: &str) -> Result<Self, PoolError> {
		toml::from_str(raw).map_err(|_| PoolError::InvalidConfiguration { field: "toml" })
	}

	/// Range/consistency checks that `serde` cannot express on its own.
	pub fn validate(&self) -> Result<(), PoolError> {
		if !(self.pool.ema_alpha > 0.0 && self.pool.ema_alpha <= 1.0) {
			return Err(PoolError::InvalidConfiguration { field: "pool.ema_alpha" });
		}
		if self.pool.window_secs == 0 {
			return Err(PoolError::InvalidConfiguration { field: "pool.window_secs" });
		}
		if self.breaker.failure_threshold == 0 {
			return Err(PoolError::InvalidConfiguration {
				field: "breaker.failure_threshold",
			});
		}
		if self.breaker.max_cooldown_secs < self.breaker.cooldown_secs {
			return Err(PoolError::InvalidConfiguration {
				field: "breaker.max_cooldown_secs",
			});
		}
		if self.retry.max_attempts == 0 {
			return Err(PoolError::InvalidConfiguration { field: "retry.max_attempts" });
		}
		if self.retry.multiplier < 1.0 {
			return Err(PoolError::InvalidConfiguration { field: "retry.multiplier" });
		}
		if self.validation.max_concurrency == 0 {
			return Err(PoolError::InvalidConfiguration {
				field: "validation.max_concurrency",
			});
		}
		if self.validation.echo_endpoints.is_empty() && self.validation.level != ValidationLevelSetting::Basic {
			return Err(PoolError::InvalidConfiguration {
				field: "validation.echo_endpoints",
			});
		}
		if self.health.check_interval_secs == 0 {
			return Err(PoolError::InvalidConfiguration {
				field: "health.check_interval_secs",
			});
		}
		if self.session.ttl_secs == 0 {
			return Err(PoolError::InvalidConfiguration { field: "session.ttl_secs" });
		}
		if self.session.janitor_interval_secs == 0 {
			return Err(PoolError::InvalidConfiguration {
				field: "session.janitor_interval_secs",
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let config = Config::default();
		assert!(config.validate().is_ok());
	}

	#[test]
	fn rejects_zero_failure_threshold() {
		let mut config = Config::default();
		config.breaker.failure_threshold = 0;
		assert!(config.validate().is_err());
	}

	#[test]
	fn rejects_ema_alpha_out_of_range() {
		let mut config = Config::default();
		config.pool.ema_alpha = 1.5;
		assert!(config.validate().is_err());
	}
}

use crate::proxy::ProxyId;
use thiserror::Error;

/// Why a strategy could not produce a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedReason {
	/// Pool has no proxies at all.
	Empty,
	/// Every proxy is present but none is `HEALTHY`.
	AllUnhealthy,
	/// Every admitted candidate was excluded by the selection context.
	AllExcluded,
	/// A composite filter chain emptied the candidate set.
	Filters,
	/// Every candidate's circuit breaker denies traffic.
	BreakersOpen,
}

/// Which validator stage a failure occurred at. Ordered by pipeline depth
/// (`Format < Tcp < Http < Anonymity`) so callers can express "at least
/// reached HTTP" with a simple comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationStage {
	Format,
	Tcp,
	Http,
	Anonymity,
}

/// Top-level error taxonomy for the pool core, per the spec's error
/// handling design: strategy/retry errors surface to callers, single-proxy
/// failures never do.
#[derive(Debug, Error)]
pub enum PoolError {
	#[error("proxy {0:?} already present")]
	DuplicateProxy(ProxyId),

	#[error("unknown proxy {0:?}")]
	UnknownProxy(ProxyId),

	#[error("pool exhausted: {0:?}")]
	ExhaustedPool(ExhaustedReason),

	#[error("strategy preconditions unmet, missing fields: {fields:?}")]
	MissingMetadata { fields: Vec<&'static str> },

	#[error("validation failed at {stage:?}: {reason}")]
	ValidationFailed {
		stage: ValidationStage,
		reason: String,
	},

	#[error("service unavailable: all breakers open")]
	ServiceUnavailable,

	#[error("retry budget exceeded")]
	BudgetExceeded,

	#[error("invalid configuration: {field}")]
	InvalidConfiguration { field: &'static str },

	#[error("storage failure: {0}")]
	StorageFailure(String),
}

pub type PoolResult<T> = Result<T, PoolError>;

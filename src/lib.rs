pub mod breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod health_monitor;
pub mod loader;
pub mod metrics;
pub mod pool;
pub mod proxy;
pub mod retry;
pub mod service;
pub mod session;
pub mod store;
pub mod strategy;
pub mod validator;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker, CircuitBreakerRegistry};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::Config;
pub use error::{ExhaustedReason, PoolError, PoolResult, ValidationStage};
pub use health_monitor::{HealthMonitor, HealthMonitorConfig};
pub use loader::{CandidateProxy, IngestReport, Loader, LoaderError, StaticListLoader};
pub use metrics::{MetricsSink, NoopSink, PrometheusSink};
pub use pool::{Pool, SnapshotFilter};
pub use proxy::{AnonymityLevel, HealthStatus, ProxyId, ProxyIdentity, ProxySnapshot, Scheme, Secret};
pub use retry::{BackoffKind, HttpMethod, Outcome, RetryExecutor, RetryPolicy};
pub use service::ProxyPoolService;
pub use session::{Session, SessionJanitor, SessionManager};
pub use store::{JsonFileStore, ProxyRecord, Snapshot, Store};
pub use store::SnapshotFilter as StoreSnapshotFilter;
pub use strategy::{RotationStrategy, SelectionContext, StrategyConfig, StrategyEngine};
pub use validator::{ValidationLevel, ValidationOutcome, ValidationRecord, Validator, ValidatorConfig};

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

/// Abstract emitter the core records against without regard to backend
/// (C8). A host embedding this crate can supply a no-op sink, this
/// crate's Prometheus-backed sink, or its own.
pub trait MetricsSink: Send + Sync {
	fn incr_counter(&self, name: &'static str, proxy_id: Option<&str>);
	fn set_gauge(&self, name: &'static str, value: f64);
	fn observe_histogram(&self, name: &'static str, value_ms: f64);
}

/// Discards every event; useful for tests and embedders that don't want
/// metrics at all.
#[derive(Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
	fn incr_counter(&self, _name: &'static str, _proxy_id: Option<&str>) {}
	fn set_gauge(&self, _name: &'static str, _value: f64) {}
	fn observe_histogram(&self, _name: &'static str, _value_ms: f64) {}
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ProxyLabel {
	proxy_id: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
enum EventLabel {
	Value(&'static str),
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct EventLabelSet {
	event: String,
}

/// Default metrics implementation, grounded on the teacher crate's own
/// `prometheus_client::registry::Registry` + Axum `/metrics` route
/// pattern (`src/metrics.rs` in the reference crate), renamed to this
/// crate's own sub-registry prefix.
pub struct PrometheusSink {
	registry: Arc<Registry>,
	counters: Family<EventLabelSet, Counter>,
	gauges: Family<EventLabelSet, Gauge<f64, std::sync::atomic::AtomicU64>>,
	histograms: Family<EventLabelSet, Histogram>,
}

impl PrometheusSink {
	pub fn new() -> Self {
		let mut registry = Registry::default();
		let sub = registry.sub_registry_with_prefix("proxy_pool");

		let counters = Family::<EventLabelSet, Counter>::default();
		sub.register("events_total", "Count of pool events by kind", counters.clone());

		let gauges = Family::<EventLabelSet, Gauge<f64, std::sync::atomic::AtomicU64>>::default();
		sub.register("gauges", "Observed gauge values by kind", gauges.clone());

		let histograms = Family::<EventLabelSet, Histogram>::new_with_constructor(|| {
			Histogram::new([1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0].into_iter())
		});
		sub.register("latency_ms", "Observed latencies in milliseconds", histograms.clone());

		PrometheusSink {
			registry: Arc::new(registry),
			counters,
			gauges,
			histograms,
		}
	}

	pub fn router(self: &Arc<Self>) -> Router {
		Router::new()
			.route("/metrics", get(metrics_handler))
			.with_state(self.clone())
	}
}

impl Default for PrometheusSink {
	fn default() -> Self {
		Self::new()
	}
}

impl MetricsSink for PrometheusSink {
	fn incr_counter(&self, name: &'static str, _proxy_id: Option<&str>) {
		self
			.counters
			.get_or_create(&EventLabelSet {
				event: name.to_string(),
			})
			.inc();
	}

	fn set_gauge(&self, name: &'static str, value: f64) {
		self
			.gauges
			.get_or_create(&EventLabelSet {
				event: name.to_string(),
			})
			.set(value);
	}

	fn observe_histogram(&self, name: &'static str, value_ms: f64) {
		self
			.histograms
			.get_or_create(&EventLabelSet {
				event: name.to_string(),
			})
			.observe(value_ms);
	}
}

async fn metrics_handler(State(sink): State<Arc<PrometheusSink>>) -> Result<String, StatusCode> {
	let mut buffer = String::new();
	encode(&mut buffer, &sink.registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
	Ok(buffer)
}

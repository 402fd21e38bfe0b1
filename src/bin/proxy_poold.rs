use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use proxy_pool::config::Config;
use proxy_pool::loader::Loader;
use proxy_pool::metrics::PrometheusSink;
use proxy_pool::service::ProxyPoolService;
use proxy_pool::validator::ValidationLevel;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
	/// Path to a TOML configuration file. Defaults are used if omitted.
	#[arg(short, long, value_name = "file")]
	config: Option<PathBuf>,

	/// Address the metrics HTTP server binds to.
	#[arg(long, default_value = "0.0.0.0:9897")]
	metrics_addr: String,

	/// Line-delimited proxy list file to ingest at startup.
	#[arg(long, value_name = "file")]
	proxy_list: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();

	let args = Args::parse();

	let config = match args.config {
		Some(path) => {
			let raw = tokio::fs::read_to_string(&path)
				.await
				.with_context(|| format!("reading config file {}", path.display()))?;
			Config::from_toml_str(&raw)?
		},
		None => Config::default(),
	};
	config.validate()?;

	let metrics = Arc::new(PrometheusSink::new());
	let service = Arc::new(ProxyPoolService::new(config.clone())?.with_metrics_sink(metrics.clone()));

	if let Some(path) = args.proxy_list {
		let loader: Box<dyn Loader> =
			Box::new(proxy_pool::loader::LineDelimitedFileLoader::new("startup_file", path));
		let report = service
			.fetch_proxies(&[loader], ValidationLevel::Standard)
			.await;
		tracing::info!(
			offered = report.offered,
			admitted = report.admitted.len(),
			rejected = report.rejected,
			duplicates = report.duplicates,
			"startup proxy ingestion complete"
		);
	}

	service.start_health_monitor(config.health.to_health_monitor_config());
	service.start_session_janitor();

	let mut run_set = JoinSet::new();

	let listener = tokio::net::TcpListener::bind(&args.metrics_addr)
		.await
		.with_context(|| format!("binding metrics listener on {}", args.metrics_addr))?;
	let router = metrics.router();
	run_set.spawn(async move {
		axum::serve(listener, router)
			.await
			.expect("metrics server");
	});

	let shutdown_service = service.clone();
	run_set.spawn(async move {
		let _ = tokio::signal::ctrl_c().await;
		shutdown_service.stop_health_monitor();
		shutdown_service.stop_session_janitor();
	});

	while let Some(result) = run_set.join_next().await {
		result?;
	}
	Ok(())
}

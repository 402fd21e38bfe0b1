use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::ValidationStage;
use crate::proxy::{AnonymityLevel, ProxyId, ProxyIdentity, Scheme};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationLevel {
	/// TCP reachability only.
	Basic,
	/// TCP + HTTP reachability.
	Standard,
	/// TCP + HTTP + anonymity classification.
	Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
	Pass,
	Fail,
	Timeout,
}

#[derive(Debug, Clone)]
pub struct ValidationRecord {
	pub proxy_id: ProxyId,
	pub stage_reached: ValidationStage,
	pub outcome: ValidationOutcome,
	pub latency_ms: Option<f64>,
	pub error_kind: Option<String>,
	pub anonymity: Option<AnonymityLevel>,
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
	pub level: ValidationLevel,
	pub timeout: Duration,
	pub max_concurrency: usize,
	/// Injectable echo-endpoint set (Open Question D1 in SPEC_FULL.md):
	/// each entry must return the caller's apparent address as JSON.
	pub echo_endpoints: Vec<String>,
}

impl Default for ValidatorConfig {
	fn default() -> Self {
		ValidatorConfig {
			level: ValidationLevel::Standard,
			timeout: Duration::from_secs(5),
			max_concurrency: 50,
			echo_endpoints: vec!["https://echo.proxy-pool.internal/ip".to_string()],
		}
	}
}

#[derive(Debug, Deserialize)]
struct EchoResponse {
	origin: String,
	#[serde(default)]
	headers: std::collections::HashMap<String, String>,
}

/// Multi-stage validation pipeline (C2): format -> TCP -> HTTP ->
/// anonymity. Each stage may short-circuit; format failures are terminal
/// and never dial the network.
pub struct Validator {
	config: ValidatorConfig,
	http: reqwest::Client,
}

impl Validator {
	pub fn new(config: ValidatorConfig) -> Self {
		Validator {
			config,
			http: reqwest::Client::builder()
				.build()
				.expect("default reqwest client"),
		}
	}

	pub fn validate_format(identity: &ProxyIdentity) -> Result<(), String> {
		if identity.host.trim().is_empty() {
			return Err("empty host".to_string());
		}
		if identity.port == 0 {
			return Err("port out of range".to_string());
		}
		Ok(())
	}

	async fn check_tcp(&self, identity: &ProxyIdentity) -> ValidationRecord {
		let addr = format!("{}:{}", identity.host, identity.port);
		match timeout(self.config.timeout, TcpStream::connect(&addr)).await {
			Ok(Ok(_)) => ValidationRecord {
				proxy_id: identity.id.clone(),
				stage_reached: ValidationStage::Tcp,
				outcome: ValidationOutcome::Pass,
				latency_ms: None,
				error_kind: None,
				anonymity: None,
			},
			Ok(Err(e)) => ValidationRecord {
				proxy_id: identity.id.clone(),
				stage_reached: ValidationStage::Tcp,
				outcome: ValidationOutcome::Fail,
				latency_ms: None,
				error_kind: Some(e.to_string()),
				anonymity: None,
			},
			Err(_) => ValidationRecord {
				proxy_id: identity.id.clone(),
				stage_reached: ValidationStage::Tcp,
				outcome: ValidationOutcome::Timeout,
				latency_ms: None,
				error_kind: Some("tcp connect timeout".to_string()),
				anonymity: None,
			},
		}
	}

	fn proxy_url(identity: &ProxyIdentity) -> String {
		let scheme = match identity.scheme {
			Scheme::Http => "http",
			Scheme::Https => "https",
			Scheme::Socks4 => "socks4",
			Scheme::Socks5 => "socks5",
		};
		match &identity.username {
			Some(user) => format!("{scheme}://{user}@{}:{}", identity.host, identity.port),
			None => format!("{scheme}://{}:{}", identity.host, identity.port),
		}
	}

	async fn check_http(&self, identity: &ProxyIdentity) -> (ValidationRecord, Option<EchoResponse>) {
		let endpoint = self
			.config
			.echo_endpoints
			.first()
			.cloned()
			.unwrap_or_else(|| "https://echo.proxy-pool.internal/ip".to_string());
		let proxy = match reqwest::Proxy::all(Self::proxy_url(identity)) {
			Ok(p) => p,
			Err(e) => {
				return (
					ValidationRecord {
						proxy_id: identity.id.clone(),
						stage_reached: ValidationStage::Http,
						outcome: ValidationOutcome::Fail,
						latency_ms: None,
						error_kind: Some(e.to_string()),
						anonymity: None,
					},
					None,
				);
			},
		};
		let client = match reqwest::Client::builder().proxy(proxy).build() {
			Ok(c) => c,
			Err(e) => {
				return (
					ValidationRecord {
						proxy_id: identity.id.clone(),
						stage_reached: ValidationStage::Http,
						outcome: ValidationOutcome::Fail,
						latency_ms: None,
						error_kind: Some(e.to_string()),
						anonymity: None,
					},
					None,
				);
			},
		};

		let started = std::time::Instant::now();
		let result = timeout(self.config.timeout, client.get(&endpoint).send()).await;
		let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

		match result {
			Ok(Ok(resp)) if resp.status() == reqwest::StatusCode::OK => {
				let body = resp.json::<EchoResponse>().await.ok();
				(
					ValidationRecord {
						proxy_id: identity.id.clone(),
						stage_reached: ValidationStage::Http,
						outcome: ValidationOutcome::Pass,
						latency_ms: Some(latency_ms),
						error_kind: None,
						anonymity: None,
					},
					body,
				)
			},
			Ok(Ok(resp)) => (
				ValidationRecord {
					proxy_id: identity.id.clone(),
					stage_reached: ValidationStage::Http,
					outcome: ValidationOutcome::Fail,
					latency_ms: Some(latency_ms),
					error_kind: Some(format!("unexpected status {}", resp.status())),
					anonymity: None,
				},
				None,
			),
			Ok(Err(e)) => (
				ValidationRecord {
					proxy_id: identity.id.clone(),
					stage_reached: ValidationStage::Http,
					outcome: ValidationOutcome::Fail,
					latency_ms: None,
					error_kind: Some(e.to_string()),
					anonymity: None,
				},
				None,
			),
			Err(_) => (
				ValidationRecord {
					proxy_id: identity.id.clone(),
					stage_reached: ValidationStage::Http,
					outcome: ValidationOutcome::Timeout,
					latency_ms: None,
					error_kind: Some("http request timeout".to_string()),
					anonymity: None,
				},
				None,
			),
		}
	}

	/// Classifies anonymity by comparing the echo-reported client address
	/// and forwarding headers against the local outbound address.
	fn classify_anonymity(echo: &EchoResponse, local_ip: &str) -> AnonymityLevel {
		let leaks_client_ip = echo.origin.contains(local_ip);
		let has_proxy_headers = echo
			.headers
			.keys()
			.any(|k| k.eq_ignore_ascii_case("via") || k.eq_ignore_ascii_case("x-forwarded-for"));
		match (leaks_client_ip, has_proxy_headers) {
			(true, _) => AnonymityLevel::Transparent,
			(false, true) => AnonymityLevel::Anonymous,
			(false, false) => AnonymityLevel::Elite,
		}
	}

	/// Runs one proxy through every stage up to `self.config.level`.
	pub async fn validate_one(&self, identity: &ProxyIdentity, local_ip: &str) -> ValidationRecord {
		if let Err(reason) = Self::validate_format(identity) {
			return ValidationRecord {
				proxy_id: identity.id.clone(),
				stage_reached: ValidationStage::Format,
				outcome: ValidationOutcome::Fail,
				latency_ms: None,
				error_kind: Some(reason),
				anonymity: None,
			};
		}

		let tcp = self.check_tcp(identity).await;
		if tcp.outcome != ValidationOutcome::Pass || self.config.level == ValidationLevel::Basic {
			return tcp;
		}

		let (mut http, echo) = self.check_http(identity).await;
		if http.outcome != ValidationOutcome::Pass || self.config.level == ValidationLevel::Standard {
			return http;
		}

		if let Some(echo) = echo {
			http.anonymity = Some(Self::classify_anonymity(&echo, local_ip));
			http.stage_reached = ValidationStage::Anonymity;
		}
		http
	}

	/// Fans candidates out up to `max_concurrency` concurrent validations.
	/// A single proxy's failure is reported, never aborts the batch; order
	/// of completion is not the order of the input (callers key by id).
	pub async fn validate_batch(
		&self,
		identities: &[ProxyIdentity],
		local_ip: &str,
	) -> Vec<ValidationRecord> {
		stream::iter(identities.iter())
			.map(|identity| self.validate_one(identity, local_ip))
			.buffer_unordered(self.config.max_concurrency.max(1))
			.collect()
			.await
	}
}

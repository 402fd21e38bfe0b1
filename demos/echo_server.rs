//! Minimal echo endpoint matching the contract the anonymity-classification
//! stage expects (spec.md §4.2 stage 4): GET /ip returns `200` with a JSON
//! body `{"origin": "<client addr>", "headers": {...}}`, reflecting
//! whatever `Via`/`X-Forwarded-For` headers arrived. Not part of the
//! library; run with `cargo run --example echo_server` to exercise the
//! validator's HTTP/anonymity stages against a real socket instead of a
//! mocked client.
use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct EchoResponse {
	origin: String,
	headers: HashMap<String, String>,
}

async fn ip_handler(ConnectInfo(addr): ConnectInfo<SocketAddr>, headers: HeaderMap) -> Json<EchoResponse> {
	let forwarded: HashMap<String, String> = headers
		.iter()
		.filter(|(name, _)| {
			let name = name.as_str();
			name.eq_ignore_ascii_case("via") || name.eq_ignore_ascii_case("x-forwarded-for")
		})
		.filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
		.collect();

	Json(EchoResponse {
		origin: addr.ip().to_string(),
		headers: forwarded,
	})
}

#[tokio::main]
async fn main() {
	let app = Router::new().route("/ip", get(ip_handler));
	let listener = tokio::net::TcpListener::bind("127.0.0.1:8181")
		.await
		.expect("binding echo server listener");
	println!("echo server listening on {}", listener.local_addr().unwrap());
	axum::serve(
		listener,
		app.into_make_service_with_connect_info::<SocketAddr>(),
	)
	.await
	.expect("echo server");
}

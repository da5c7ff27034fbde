//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_http_requests_total` (counter): requests by path group, method, status
//! - `gateway_http_request_failures_total` (counter): same labels, status >= 500
//! - `gateway_http_request_duration_seconds` (histogram): latency by path group
//! - `gateway_http_inflight_requests` (gauge)
//! - `gateway_rate_limited_total` (counter)
//! - `gateway_config_reloads_total` (counter): reloads by outcome
//! - `gateway_route_table_generation`, `gateway_route_table_routes` (gauges)
//! - `gateway_admission_clients` (gauge), `gateway_admission_evicted_total` (counter)
//!
//! Recording goes through the `metrics` facade, so every function here is a
//! no-op until [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

const REQUESTS_TOTAL: &str = "gateway_http_requests_total";
const REQUEST_FAILURES_TOTAL: &str = "gateway_http_request_failures_total";
const REQUEST_DURATION: &str = "gateway_http_request_duration_seconds";
const INFLIGHT_REQUESTS: &str = "gateway_http_inflight_requests";
const RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
const CONFIG_RELOADS_TOTAL: &str = "gateway_config_reloads_total";
const ROUTE_TABLE_GENERATION: &str = "gateway_route_table_generation";
const ROUTE_TABLE_ROUTES: &str = "gateway_route_table_routes";
const ADMISSION_CLIENTS: &str = "gateway_admission_clients";
const ADMISSION_EVICTED_TOTAL: &str = "gateway_admission_evicted_total";

/// Prometheus default latency buckets.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the global recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), LATENCY_BUCKETS)?
        .install()?;
    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Collapse the second path segment so per-entity paths share one series.
///
/// `/users/42/posts` becomes `/users/:id/posts`.
pub fn path_group(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').collect();
    if segments.len() > 2 {
        segments[2] = ":id";
    }
    segments.join("/")
}

pub fn record_request(path_group: String, method: String, status: u16, start: Instant) {
    let status = status.to_string();
    if status.starts_with('5') {
        counter!(
            REQUEST_FAILURES_TOTAL,
            "path" => path_group.clone(),
            "method" => method.clone(),
            "status" => status.clone()
        )
        .increment(1);
    }
    counter!(
        REQUESTS_TOTAL,
        "path" => path_group.clone(),
        "method" => method,
        "status" => status
    )
    .increment(1);
    histogram!(REQUEST_DURATION, "path" => path_group).record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!(RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_reload(outcome: &'static str) {
    counter!(CONFIG_RELOADS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_route_table(generation: u64, routes: usize) {
    gauge!(ROUTE_TABLE_GENERATION).set(generation as f64);
    gauge!(ROUTE_TABLE_ROUTES).set(routes as f64);
}

pub fn record_evicted_clients(evicted: usize, remaining: usize) {
    counter!(ADMISSION_EVICTED_TOTAL).increment(evicted as u64);
    gauge!(ADMISSION_CLIENTS).set(remaining as f64);
}

/// Decrements the in-flight gauge even if the request future is dropped.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        gauge!(INFLIGHT_REQUESTS).increment(1.0);
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(INFLIGHT_REQUESTS).decrement(1.0);
    }
}

/// Axum middleware recording per-request metrics.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let _in_flight = InFlight::enter();
    let start = Instant::now();
    let group = path_group(request.uri().path());
    let method = request.method().to_string();

    let response = next.run(request).await;
    record_request(group, method, response.status().as_u16(), start);
    response
}

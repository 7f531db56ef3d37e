use std::time::{Duration, Instant};

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub const RESOURCE_INIT_TOTAL: &str = "resource_init_total";
pub const RESOURCE_INIT_DURATION: &str = "resource_init_duration_seconds";
pub const RESOURCE_SHUTDOWN_TOTAL: &str = "resource_shutdown_total";
pub const RESOURCE_RESET_TOTAL: &str = "resource_reset_total";

/// Count one initialization attempt and how long it took.
/// `outcome` is "success" or the kind of the error that ended it.
pub fn record_init(resource: &'static str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!(RESOURCE_INIT_TOTAL, "resource" => resource, "outcome" => outcome)
        .increment(1);
    metrics::histogram!(RESOURCE_INIT_DURATION, "resource" => resource)
        .record(elapsed.as_secs_f64());
}

pub fn record_shutdown(resource: &'static str, outcome: &'static str) {
    metrics::counter!(RESOURCE_SHUTDOWN_TOTAL, "resource" => resource, "outcome" => outcome)
        .increment(1);
}

pub fn record_reset(resource: &'static str, outcome: &'static str) {
    metrics::counter!(RESOURCE_RESET_TOTAL, "resource" => resource, "outcome" => outcome)
        .increment(1);
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install_recorder()
}

/// Middleware to record some common HTTP metrics
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}

//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Install the Prometheus recorder.
/// Returns a handle that renders the scrape output.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "shortsmith_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "shortsmith_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "shortsmith_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "shortsmith_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "shortsmith_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "shortsmith_ws_messages_sent_total";

    // Runs
    pub const RUNS_STARTED_TOTAL: &str = "shortsmith_runs_started_total";
    pub const RUNS_REJECTED_TOTAL: &str = "shortsmith_runs_rejected_total";
}

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});

static TEMPLATE_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/api/templates/[^/]+").unwrap());

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record WebSocket connection.
pub fn record_ws_connection(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_CONNECTIONS_TOTAL, &labels).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record WebSocket message sent.
pub fn record_ws_message_sent(endpoint: &str, message_type: &str) {
    let labels = [
        ("endpoint", endpoint.to_string()),
        ("type", message_type.to_string()),
    ];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

pub fn record_run_started() {
    counter!(names::RUNS_STARTED_TOTAL).increment(1);
}

/// A run was refused because another one is active.
pub fn record_run_rejected() {
    counter!(names::RUNS_REJECTED_TOTAL).increment(1);
}

/// Sanitize path for metrics labels (run ids, template names).
fn sanitize_path(path: &str) -> String {
    let path = UUID_PATTERN.replace_all(path, ":id");
    TEMPLATE_NAME_PATTERN
        .replace_all(&path, "/api/templates/:name")
        .to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/runs/550e8400-e29b-41d4-a716-446655440000/stop"),
            "/api/runs/:id/stop"
        );
        assert_eq!(
            sanitize_path("/ws/runs/550e8400-e29b-41d4-a716-446655440000"),
            "/ws/runs/:id"
        );
        assert_eq!(
            sanitize_path("/api/templates/weekly-drop"),
            "/api/templates/:name"
        );
        assert_eq!(sanitize_path("/health"), "/health");
    }
}

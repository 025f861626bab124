use crate::circuit_breaker::CircuitState;
use crate::error::{Result, ServiceError};
use axum::{
    body::Body,
    extract::State,
    http::{header, Response, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ServiceError::Server(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "podcast_ui_requests_total",
            "Total number of HTTP requests served by the UI"
        );
        describe_histogram!(
            "podcast_ui_request_duration_seconds",
            "UI request latencies in seconds"
        );

        // API client metrics
        describe_counter!(
            "podcast_ui_client_attempts_total",
            "Total number of attempts sent to the API service"
        );
        describe_counter!(
            "podcast_ui_client_retries_total",
            "Total number of retries scheduled after a retryable failure"
        );
        describe_counter!(
            "podcast_ui_degraded_responses_total",
            "Read operations answered with an empty fallback"
        );

        // Circuit breaker metrics
        describe_gauge!(
            "podcast_ui_circuit_breaker_state",
            "Circuit breaker state (0 = closed, 1 = open, 2 = half-open)"
        );
        describe_counter!(
            "podcast_ui_circuit_breaker_transitions_total",
            "Total number of circuit breaker state transitions"
        );
        describe_counter!(
            "podcast_ui_circuit_breaker_rejections_total",
            "Calls rejected by the circuit breaker without reaching the API"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    let body = service.render();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Record a request served by the UI
pub fn record_request(method: &str, path: &str, status: u16, duration: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!("podcast_ui_requests_total", &labels).increment(1);
    histogram!("podcast_ui_request_duration_seconds", &labels).record(duration);
}

/// Record one attempt against the API service
pub fn record_attempt(operation: &str, outcome: &str) {
    let labels = [
        ("operation", operation.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("podcast_ui_client_attempts_total", &labels).increment(1);
}

pub fn record_retry(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!("podcast_ui_client_retries_total", &labels).increment(1);
}

pub fn record_degraded_response(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!("podcast_ui_degraded_responses_total", &labels).increment(1);
}

/// Record circuit breaker state
pub fn record_circuit_breaker_state(dependency: &str, state: CircuitState) {
    let labels = [("dependency", dependency.to_string())];
    gauge!("podcast_ui_circuit_breaker_state", &labels).set(state.as_gauge() as f64);
}

/// Record circuit breaker transition
pub fn record_circuit_breaker_transition(dependency: &str, from: CircuitState, to: CircuitState) {
    let labels = [
        ("dependency", dependency.to_string()),
        ("from", from.to_string()),
        ("to", to.to_string()),
    ];
    counter!("podcast_ui_circuit_breaker_transitions_total", &labels).increment(1);
    record_circuit_breaker_state(dependency, to);
}

pub fn record_circuit_breaker_rejection(dependency: &str, state: CircuitState) {
    let labels = [
        ("dependency", dependency.to_string()),
        ("state", state.to_string()),
    ];
    counter!("podcast_ui_circuit_breaker_rejections_total", &labels).increment(1);
}

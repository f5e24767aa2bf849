//! Observability Metrics
//!
//! Prometheus metrics for webhook traffic, call stage transitions and the
//! completion API. Completion attempt counters are recorded by the llm crate
//! and exported through the same recorder.

use ::metrics::{counter, gauge};
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use voice_caller_core::CallStage;

use crate::ServerError;

/// Global Prometheus handle
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Safe to call more than once; later calls return the first handle.
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| {
            ServerError::Internal(format!("Failed to install Prometheus recorder: {e}"))
        })?;

    register_default_metrics();

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the global metrics handle
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

fn register_default_metrics() {
    for route in ["outbound", "process_speech", "process_followup", "health", "not_found"] {
        counter!("voice_caller_webhook_requests_total", "route" => route).absolute(0);
    }
    gauge!("voice_caller_completion_api_up").set(0.0);
}

/// Record a webhook hit
pub fn record_request(route: &'static str) {
    counter!("voice_caller_webhook_requests_total", "route" => route).increment(1);
}

/// Record the stage a call moved into
pub fn record_transition(next: CallStage) {
    counter!("voice_caller_stage_transitions_total", "stage" => next.as_str()).increment(1);
}

/// Record error by type
pub fn record_error(error_type: &'static str) {
    counter!("voice_caller_errors_total", "type" => error_type).increment(1);
}

/// Record the latest health probe result
pub fn record_health(healthy: bool) {
    gauge!("voice_caller_completion_api_up").set(if healthy { 1.0 } else { 0.0 });
}

/// Metrics endpoint handler
///
/// Returns Prometheus-formatted metrics, or a plain notice when the recorder
/// was never installed.
pub async fn metrics_handler() -> impl IntoResponse {
    match get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        ),
        None => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "# metrics disabled\n".to_string(),
        ),
    }
}

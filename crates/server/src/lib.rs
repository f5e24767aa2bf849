//! Voice Caller Server
//!
//! Telephony webhook routes, the Twilio REST client used to place calls, and
//! Prometheus metrics.

pub mod dialer;
pub mod http;
pub mod metrics;
pub mod response;
pub mod state;

pub use dialer::{CallRecord, DialerError, TwilioClient};
pub use http::create_router;
pub use crate::metrics::{init_metrics, record_error, record_request, record_transition};
pub use response::Twiml;
pub use state::AppState;

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use voice_caller_core::VoiceResponse;
use voice_caller_llm::LlmError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Completion backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::Llm(_) => "llm",
            ServerError::Internal(_) => "internal",
        }
    }
}

impl From<FormRejection> for ServerError {
    fn from(rejection: FormRejection) -> Self {
        ServerError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::InvalidRequest(rejection.body_text())
    }
}

/// Plain status response for contexts without an apology document
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Failure inside a webhook handler.
///
/// The provider only understands voice documents, so the failure is answered
/// with a spoken apology and HTTP 200 instead of an error status.
#[derive(Debug)]
pub struct WebhookError {
    pub route: &'static str,
    pub error: ServerError,
    pub apology: VoiceResponse,
}

impl WebhookError {
    pub fn new(route: &'static str, error: impl Into<ServerError>, apology: VoiceResponse) -> Self {
        Self {
            route,
            error: error.into(),
            apology,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        tracing::error!(route = self.route, error = %self.error, "Webhook handler failed");
        record_error(self.error.kind());
        Twiml(self.apology).into_response()
    }
}

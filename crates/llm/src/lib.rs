//! Chat-completion integration
//!
//! Features:
//! - OpenAI-compatible backend with typed failures
//! - Retrying adapter that turns a caller's question into a spoken answer
//! - Minimal probe used by the health check

pub mod adapter;
pub mod backend;
pub mod prompt;

pub use adapter::{AdapterConfig, AnswerProvider, CompletionAdapter, CompletionOutcome};
pub use backend::{FinishReason, GenerationResult, LlmBackend, OpenAIBackend, OpenAIConfig};
pub use prompt::{CompletionRequest, Message, Role};

use thiserror::Error;

/// Completion failures, classified from the HTTP exchange
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Timeout")]
    Timeout,

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Completion was empty")]
    EmptyCompletion,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LlmError::RateLimited(_)
                | LlmError::Unauthorized(_)
                | LlmError::EmptyCompletion
                | LlmError::Configuration(_)
        )
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::RateLimited(_) => "rate_limited",
            LlmError::Unauthorized(_) => "unauthorized",
            LlmError::Timeout => "timeout",
            LlmError::Api { .. } => "api",
            LlmError::Network(_) => "network",
            LlmError::InvalidResponse(_) => "invalid_response",
            LlmError::EmptyCompletion => "empty",
            LlmError::Configuration(_) => "configuration",
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_decode() {
            LlmError::InvalidResponse(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(LlmError::Api { status: 500, message: "boom".into() }.is_retryable());
        assert!(LlmError::InvalidResponse("no choices".into()).is_retryable());

        assert!(!LlmError::RateLimited("slow down".into()).is_retryable());
        assert!(!LlmError::Unauthorized("bad key".into()).is_retryable());
        assert!(!LlmError::EmptyCompletion.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = LlmError::Api { status: 503, message: "overloaded".into() };
        assert_eq!(err.to_string(), "API error (HTTP 503): overloaded");
        assert_eq!(err.kind(), "api");
    }
}

//! Answer adapter
//!
//! Wraps an [`LlmBackend`] with the per-turn retry policy and exposes the
//! narrow [`AnswerProvider`] seam the webhook handlers depend on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};

use voice_caller_config::Settings;

use crate::backend::LlmBackend;
use crate::prompt::CompletionRequest;
use crate::LlmError;

/// Characters of a response kept in log lines
const LOG_PREVIEW_CHARS: usize = 100;

/// Prompt used by the health probe
const PROBE_TEXT: &str = "Test";

/// Result of a single completion attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// Trimmed, non-empty answer
    Answer(String),
    /// Worth another attempt
    Transient(LlmError),
    /// Retrying cannot help
    Permanent(LlmError),
}

impl CompletionOutcome {
    fn from_result(result: Result<String, LlmError>) -> Self {
        match result {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    CompletionOutcome::Permanent(LlmError::EmptyCompletion)
                } else {
                    CompletionOutcome::Answer(trimmed.to_string())
                }
            },
            Err(e) if e.is_retryable() => CompletionOutcome::Transient(e),
            Err(e) => CompletionOutcome::Permanent(e),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CompletionOutcome::Answer(_) => "answer",
            CompletionOutcome::Transient(_) => "transient",
            CompletionOutcome::Permanent(_) => "permanent",
        }
    }
}

/// Source of spoken answers
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    /// Answer a caller's question. `None` means "apologize instead".
    async fn get_answer(&self, user_text: &str) -> Option<String>;

    /// Single cheap completion; `true` when it succeeded
    async fn probe(&self) -> bool;
}

/// Retry and request settings for [`CompletionAdapter`]
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Applied to every attempt
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Sleep before the second attempt, doubled after each retry
    pub initial_backoff: Duration,
    pub health_max_tokens: u32,
    /// Returned as the answer when the API is rate limited
    pub high_demand_message: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl AdapterConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let completion = &settings.completion;
        Self {
            system_prompt: settings.script.system_prompt.clone(),
            max_tokens: completion.max_tokens,
            temperature: completion.temperature,
            timeout: Duration::from_secs(completion.timeout_secs),
            max_attempts: completion.max_attempts.max(1),
            initial_backoff: Duration::from_millis(completion.initial_backoff_ms),
            health_max_tokens: completion.health_max_tokens,
            high_demand_message: settings.script.high_demand.clone(),
        }
    }
}

/// Turns caller questions into answers with bounded retries
pub struct CompletionAdapter {
    backend: Arc<dyn LlmBackend>,
    config: AdapterConfig,
}

impl CompletionAdapter {
    pub fn new(backend: Arc<dyn LlmBackend>, config: AdapterConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn request_for(&self, user_text: &str) -> CompletionRequest {
        CompletionRequest::new(user_text)
            .with_system_prompt(self.config.system_prompt.as_str())
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
            .with_timeout(self.config.timeout)
    }

    /// Run one attempt and classify it
    pub async fn complete_once(&self, user_text: &str) -> CompletionOutcome {
        self.run(&self.request_for(user_text)).await
    }

    async fn run(&self, request: &CompletionRequest) -> CompletionOutcome {
        let start = Instant::now();
        let result = self.backend.complete(request).await.map(|r| r.text);
        histogram!("voice_caller_completion_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        let outcome = CompletionOutcome::from_result(result);
        counter!("voice_caller_completion_attempts_total", "outcome" => outcome.label())
            .increment(1);
        if let CompletionOutcome::Transient(e) | CompletionOutcome::Permanent(e) = &outcome {
            counter!("voice_caller_completion_errors_total", "kind" => e.kind()).increment(1);
        }
        outcome
    }
}

#[async_trait]
impl AnswerProvider for CompletionAdapter {
    async fn get_answer(&self, user_text: &str) -> Option<String> {
        let request = self.request_for(user_text);
        let mut backoff = self.config.initial_backoff;

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.run(&request).await {
                CompletionOutcome::Answer(text) => {
                    tracing::info!(
                        attempt,
                        response = %preview(&text),
                        "Completion succeeded"
                    );
                    return Some(text);
                },
                CompletionOutcome::Permanent(LlmError::RateLimited(message)) => {
                    tracing::warn!(attempt, %message, "Completion API rate limited");
                    return Some(self.config.high_demand_message.clone());
                },
                CompletionOutcome::Permanent(e) => {
                    tracing::error!(attempt, error = %e, "Completion failed, not retrying");
                    return None;
                },
                CompletionOutcome::Transient(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Completion attempt failed"
                    );
                },
            }
        }

        tracing::error!(
            attempts = self.config.max_attempts,
            "Completion attempts exhausted"
        );
        None
    }

    async fn probe(&self) -> bool {
        let request = CompletionRequest::new(PROBE_TEXT)
            .with_max_tokens(self.config.health_max_tokens)
            .with_temperature(self.config.temperature)
            .with_timeout(self.config.timeout);

        match self.backend.complete(&request).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Health check completion failed");
                false
            },
        }
    }
}

/// First [`LOG_PREVIEW_CHARS`] characters of `text`
fn preview(text: &str) -> String {
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

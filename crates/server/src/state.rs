//! Application State
//!
//! Shared, read-only state across all handlers.

use std::sync::Arc;

use voice_caller_config::Settings;
use voice_caller_core::CallFlow;
use voice_caller_llm::{
    AdapterConfig, AnswerProvider, CompletionAdapter, OpenAIBackend, OpenAIConfig,
};

use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Built once at startup, never mutated
    pub config: Arc<Settings>,
    /// Voice documents for each call stage
    pub flow: Arc<CallFlow>,
    /// Completion source for caller questions and the health probe
    pub answers: Arc<dyn AnswerProvider>,
}

impl AppState {
    /// Build state backed by the configured OpenAI-compatible API
    pub fn new(config: Settings) -> Result<Self, ServerError> {
        let backend = OpenAIBackend::new(OpenAIConfig::from_settings(&config.completion)?)?;
        let adapter =
            CompletionAdapter::new(Arc::new(backend), AdapterConfig::from_settings(&config));
        Ok(Self::with_answer_provider(config, Arc::new(adapter)))
    }

    /// Build state around any answer provider
    pub fn with_answer_provider(config: Settings, answers: Arc<dyn AnswerProvider>) -> Self {
        let flow = CallFlow::new(config.script.clone(), config.voice.clone());
        Self {
            config: Arc::new(config),
            flow: Arc::new(flow),
            answers,
        }
    }
}

//! Configuration management for the voice caller
//!
//! Supports loading configuration from:
//! - YAML/TOML files under `config/`
//! - Prefixed environment variables (`VOICE_CALLER__SECTION__KEY`)
//! - The provider-conventional variables (`OPENAI_API_KEY`, `TWILIO_*`, ...)
//!
//! Settings are built once at startup and shared read-only afterwards.

pub mod settings;

pub use settings::{
    build_settings, load_settings, load_settings_with, CompletionConfig, IntegrationsConfig,
    ObservabilityConfig, RuntimeEnvironment, Secret, ServerConfig, Settings, TwilioConfig,
    WebhookConfig, ENV_OVERRIDES,
};
pub use voice_caller_core::{CallScript, VoiceSettings};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required settings: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use voice_caller_core::{CallScript, VoiceSettings, OUTBOUND_PATH};

use crate::ConfigError;

/// Prefix for structured environment overrides (`VOICE_CALLER__SERVER__PORT`)
pub const ENV_PREFIX: &str = "VOICE_CALLER";

/// Provider-conventional variables and the setting each one fills.
///
/// These win over every other source.
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "completion.api_key"),
    ("TWILIO_ACCOUNT_SID", "twilio.account_sid"),
    ("TWILIO_AUTH_TOKEN", "twilio.auth_token"),
    ("TWILIO_PHONE_NUMBER", "twilio.phone_number"),
    ("DESTINATION_NUMBER", "twilio.destination_number"),
    ("WEBHOOK_BASE_URL", "webhook.base_url"),
    ("AZURE_SPEECH_KEY", "integrations.azure_speech_key"),
    ("AZURE_SPEECH_REGION", "integrations.azure_speech_region"),
    ("DATABASE_URL", "integrations.database_url"),
    ("WEBHOOK_SECRET", "integrations.webhook_secret"),
];

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Credential value whose `Debug` output is redacted
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat-completion API
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Speech synthesis and recognition settings
    #[serde(default)]
    pub voice: VoiceSettings,

    /// Every spoken line and the system prompt
    #[serde(default)]
    pub script: CallScript,

    /// Twilio REST credentials and numbers
    #[serde(default)]
    pub twilio: TwilioConfig,

    /// Public address the provider calls back on
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Accepted for compatibility, unused by any route
    #[serde(default)]
    pub integrations: IntegrationsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Validate settings that must hold before the server starts.
    ///
    /// Missing credentials are reported together in one error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_required()?;
        self.validate_server()?;
        self.validate_completion()?;
        self.validate_voice()?;
        self.validate_script()?;
        Ok(())
    }

    fn validate_required(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if !present(&self.completion.api_key) {
            missing.push("OPENAI_API_KEY".to_string());
        }
        if !present_str(&self.twilio.account_sid) {
            missing.push("TWILIO_ACCOUNT_SID".to_string());
        }
        if !present(&self.twilio.auth_token) {
            missing.push("TWILIO_AUTH_TOKEN".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingFields(missing))
        }
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }
        Ok(())
    }

    fn validate_completion(&self) -> Result<(), ConfigError> {
        let completion = &self.completion;

        if !(0.0..=2.0).contains(&completion.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "completion.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", completion.temperature),
            });
        }

        if completion.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "completion.max_attempts".to_string(),
                message: "At least one attempt is required".to_string(),
            });
        }

        if completion.max_tokens == 0 || completion.health_max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "completion.max_tokens".to_string(),
                message: "Token limits must be greater than 0".to_string(),
            });
        }

        if completion.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "completion.timeout_secs".to_string(),
                message: "Timeout must be greater than 0".to_string(),
            });
        }

        if completion.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "completion.endpoint".to_string(),
                message: "Endpoint cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    fn validate_voice(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.voice.min_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "voice.min_confidence".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    self.voice.min_confidence
                ),
            });
        }
        Ok(())
    }

    fn validate_script(&self) -> Result<(), ConfigError> {
        let blank = self.script.blank_lines();
        if let Some(first) = blank.first() {
            return Err(ConfigError::InvalidValue {
                field: format!("script.{first}"),
                message: "Spoken lines cannot be blank".to_string(),
            });
        }
        Ok(())
    }

    /// Extra checks needed before placing an outbound call
    pub fn validate_for_dialing(&self) -> Result<(), ConfigError> {
        let twilio = &self.twilio;

        let mut missing = Vec::new();
        if !present_str(&twilio.account_sid) {
            missing.push("TWILIO_ACCOUNT_SID".to_string());
        }
        if !present(&twilio.auth_token) {
            missing.push("TWILIO_AUTH_TOKEN".to_string());
        }
        if !present_str(&twilio.phone_number) {
            missing.push("TWILIO_PHONE_NUMBER".to_string());
        }
        if !present_str(&twilio.destination_number) {
            missing.push("DESTINATION_NUMBER".to_string());
        }
        if !present_str(&self.webhook.base_url) {
            missing.push("WEBHOOK_BASE_URL".to_string());
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing));
        }

        let sid = twilio.account_sid.as_deref().unwrap_or_default();
        let token = twilio.auth_token.as_ref().map(Secret::expose).unwrap_or_default();
        let phone = twilio.phone_number.as_deref().unwrap_or_default();
        let destination = twilio.destination_number.as_deref().unwrap_or_default();
        let base_url = self.webhook.base_url.as_deref().unwrap_or_default();

        let placeholders = [
            ("twilio.account_sid", sid == "YOUR_account_sid_HERE"),
            ("twilio.auth_token", token == "YOUR_auth_token_HERE"),
            ("twilio.phone_number", phone == "YOUR_twilio_number"),
            ("twilio.destination_number", destination == "+1234567890"),
            ("webhook.base_url", base_url.contains("your-ngrok-url")),
        ];
        if let Some((field, _)) = placeholders.iter().find(|(_, is_placeholder)| *is_placeholder) {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: "Still has a placeholder value".to_string(),
            });
        }

        if !sid.starts_with("AC") {
            let prefix: String = sid.chars().take(5).collect();
            return Err(ConfigError::InvalidValue {
                field: "twilio.account_sid".to_string(),
                message: format!("Should start with 'AC', got: {prefix}..."),
            });
        }

        if token.chars().count() != 32 {
            return Err(ConfigError::InvalidValue {
                field: "twilio.auth_token".to_string(),
                message: format!(
                    "Should be 32 characters, got {} characters",
                    token.chars().count()
                ),
            });
        }

        Ok(())
    }

    /// Absolute URL the provider fetches when an outbound call connects
    pub fn outbound_url(&self) -> Option<String> {
        let base = self.webhook.base_url.as_deref()?.trim().trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        if base.ends_with(OUTBOUND_PATH) {
            Some(base.to_string())
        } else {
            Some(format!("{base}{OUTBOUND_PATH}"))
        }
    }

    /// Whether each provider-conventional setting has a value, keyed by variable name
    pub fn presence(&self) -> Vec<(&'static str, bool)> {
        let integrations = &self.integrations;
        vec![
            ("OPENAI_API_KEY", present(&self.completion.api_key)),
            ("TWILIO_ACCOUNT_SID", present_str(&self.twilio.account_sid)),
            ("TWILIO_AUTH_TOKEN", present(&self.twilio.auth_token)),
            ("TWILIO_PHONE_NUMBER", present_str(&self.twilio.phone_number)),
            ("DESTINATION_NUMBER", present_str(&self.twilio.destination_number)),
            ("WEBHOOK_BASE_URL", present_str(&self.webhook.base_url)),
            ("AZURE_SPEECH_KEY", present(&integrations.azure_speech_key)),
            ("AZURE_SPEECH_REGION", present_str(&integrations.azure_speech_region)),
            ("DATABASE_URL", present(&integrations.database_url)),
            ("WEBHOOK_SECRET", present(&integrations.webhook_secret)),
        ]
    }
}

fn present(secret: &Option<Secret>) -> bool {
    secret.as_ref().is_some_and(|s| !s.is_blank())
}

fn present_str(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// OpenAI-compatible chat-completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Base URL; `/chat/completions` is appended
    #[serde(default = "default_completion_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<Secret>,

    #[serde(default)]
    pub organization: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-attempt request timeout
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    /// Total attempts per turn, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, doubled for each one after
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Token limit for the health probe
    #[serde(default = "default_health_max_tokens")]
    pub health_max_tokens: u32,
}

fn default_completion_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4".to_string()
}
fn default_max_tokens() -> u32 {
    150
}
fn default_temperature() -> f32 {
    0.3
}
fn default_completion_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    100
}
fn default_health_max_tokens() -> u32 {
    5
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_completion_endpoint(),
            api_key: None,
            organization: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_completion_timeout(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            health_max_tokens: default_health_max_tokens(),
        }
    }
}

/// Twilio account and numbers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: Option<String>,

    #[serde(default)]
    pub auth_token: Option<Secret>,

    /// Caller ID for outbound calls, E.164
    #[serde(default)]
    pub phone_number: Option<String>,

    /// Default callee for the `call` command, E.164
    #[serde(default)]
    pub destination_number: Option<String>,

    /// REST API root including the version segment
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com/2010-04-01".to_string()
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            phone_number: None,
            destination_number: None,
            api_base: default_twilio_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    /// Public base URL, e.g. an ngrok tunnel
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Credentials for integrations no route uses yet
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub azure_speech_key: Option<Secret>,

    #[serde(default)]
    pub azure_speech_region: Option<String>,

    #[serde(default)]
    pub database_url: Option<Secret>,

    #[serde(default)]
    pub webhook_secret: Option<Secret>,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Append logs to this file instead of stdout
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            log_file: None,
            metrics_enabled: true,
        }
    }
}

/// Load and validate settings from `config/` and the process environment
///
/// Priority (highest to lowest):
/// 1. Provider-conventional variables (see [`ENV_OVERRIDES`])
/// 2. Environment variables (`VOICE_CALLER__` prefix)
/// 3. config/{env}.yaml (if env specified)
/// 4. config/default.yaml
/// 5. Built-in defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    load_settings_with(env, &vars)
}

/// Same as [`load_settings`] with an explicit variable map
pub fn load_settings_with(
    env: Option<&str>,
    vars: &HashMap<String, String>,
) -> Result<Settings, ConfigError> {
    let settings = build_settings(Path::new("config"), env, vars)?;
    settings.validate()?;
    Ok(settings)
}

/// Merge every source without validating
pub fn build_settings(
    config_dir: &Path,
    env: Option<&str>,
    vars: &HashMap<String, String>,
) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = config_dir.join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    if let Some(env_name) = env {
        let env_path = config_dir.join(env_name);
        builder =
            builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));
    }

    let env_source: config::Map<String, String> =
        vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(Some(env_source)),
    );

    for (var, key) in ENV_OVERRIDES {
        let value = vars
            .get(*var)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        builder = builder.set_override_option(*key, value)?;
    }

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    tracing::debug!(
        environment = ?settings.environment,
        port = settings.server.port,
        model = %settings.completion.model,
        "Settings loaded"
    );

    Ok(settings)
}

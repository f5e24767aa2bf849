//! Completion backends
//!
//! [`OpenAIBackend`] talks to any OpenAI-compatible `/chat/completions`
//! endpoint and classifies failures from the HTTP status and error body, so
//! callers never need to inspect error text.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use voice_caller_config::CompletionConfig;

use crate::prompt::{CompletionRequest, Message};
use crate::LlmError;

/// Completion result
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// Generated text, untrimmed
    pub text: String,
    /// Completion tokens reported by the API
    pub tokens: usize,
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other,
}

impl FinishReason {
    fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") | None => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(_) => FinishReason::Other,
        }
    }
}

/// Completion backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Run one completion. No retries happen at this layer.
    async fn complete(&self, request: &CompletionRequest) -> Result<GenerationResult, LlmError>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Configuration for OpenAI-compatible backends
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API base, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Organization ID (OpenAI specific)
    pub organization: Option<String>,
    /// Connect timeout. Request timeouts come from each [`CompletionRequest`].
    pub connect_timeout: Duration,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4".to_string(),
            organization: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl OpenAIConfig {
    /// Build from the `completion` settings section
    pub fn from_settings(settings: &CompletionConfig) -> Result<Self, LlmError> {
        let api_key = settings
            .api_key
            .as_ref()
            .map(|key| key.expose().trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| LlmError::Configuration("completion API key is not set".to_string()))?;

        Ok(Self {
            endpoint: settings.endpoint.clone(),
            api_key,
            model: settings.model.clone(),
            organization: settings.organization.clone(),
            ..Default::default()
        })
    }
}

/// OpenAI-compatible backend
///
/// Works with OpenAI itself and any server exposing the same chat API.
pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() && !config.endpoint.starts_with("http://localhost") {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        use reqwest::header::HeaderValue;

        let mut headers = reqwest::header::HeaderMap::new();

        let auth_value = format!("Bearer {}", self.config.api_key);
        if let Ok(val) = HeaderValue::from_str(&auth_value) {
            headers.insert(reqwest::header::AUTHORIZATION, val);
        }

        if let Some(ref org) = self.config.organization {
            if let Ok(val) = HeaderValue::from_str(org) {
                headers.insert("OpenAI-Organization", val);
            }
        }

        headers
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();

        let body = OpenAIChatRequest {
            model: &self.config.model,
            messages: request.messages(),
            max_tokens: request.max_tokens(),
            temperature: request.temperature(),
        };

        let response = self
            .client
            .post(self.chat_url())
            .headers(self.build_headers())
            .timeout(request.timeout())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &error_text));
        }

        let response: OpenAIChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::InvalidResponse(e.to_string())
            }
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        Ok(GenerationResult {
            text: choice.message.content.unwrap_or_default(),
            tokens: response.usage.map(|u| u.completion_tokens).unwrap_or(0),
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Map a non-2xx response onto an error kind
pub(crate) fn error_for_status(status: StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<OpenAIErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Unauthorized(message),
        StatusCode::REQUEST_TIMEOUT => LlmError::Timeout,
        _ => LlmError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    error: Option<OpenAIErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> OpenAIBackend {
        let config = OpenAIConfig {
            endpoint: format!("{}/v1", server.uri()),
            api_key: "sk-test".to_string(),
            organization: Some("org-123".to_string()),
            ..Default::default()
        };
        OpenAIBackend::new(config).unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("What is the price?").with_system_prompt("Be brief.")
    }

    fn error_body(message: &str) -> serde_json::Value {
        json!({"error": {"message": message, "type": "error"}})
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("openai-organization", "org-123"))
            .and(body_partial_json(json!({
                "model": "gpt-4",
                "max_tokens": 150,
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "What is the price?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "  Starting at $180,000.  "},
                    "finish_reason": "stop"
                }],
                "usage": {"completion_tokens": 7, "prompt_tokens": 20, "total_tokens": 27}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = backend_for(&server).complete(&request()).await.unwrap();
        assert_eq!(result.text, "  Starting at $180,000.  ");
        assert_eq!(result.tokens, 7);
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (429, LlmError::RateLimited("Rate limit reached".into())),
            (401, LlmError::Unauthorized("Rate limit reached".into())),
            (403, LlmError::Unauthorized("Rate limit reached".into())),
            (408, LlmError::Timeout),
            (
                500,
                LlmError::Api {
                    status: 500,
                    message: "Rate limit reached".into(),
                },
            ),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(
                    ResponseTemplate::new(status).set_body_json(error_body("Rate limit reached")),
                )
                .mount(&server)
                .await;

            let err = backend_for(&server).complete(&request()).await.unwrap_err();
            assert_eq!(err, expected, "HTTP {status}");
        }
    }

    #[tokio::test]
    async fn test_error_message_matching_does_not_drive_kind() {
        // A 500 whose text mentions rate limits is still a plain API error
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("rate limit upstream"))
            .mount(&server)
            .await;

        let err = backend_for(&server).complete(&request()).await.unwrap_err();
        assert_eq!(
            err,
            LlmError::Api {
                status: 502,
                message: "rate limit upstream".into()
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_no_choices_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = backend_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = backend_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let request = request().with_timeout(Duration::from_millis(50));
        let err = backend_for(&server).complete(&request).await.unwrap_err();
        assert_eq!(err, LlmError::Timeout);
    }

    #[test]
    fn test_config_requires_api_key() {
        let settings = CompletionConfig::default();
        assert!(matches!(
            OpenAIConfig::from_settings(&settings),
            Err(LlmError::Configuration(_))
        ));

        let settings = CompletionConfig {
            api_key: Some("sk-live".into()),
            model: "gpt-4o".to_string(),
            ..Default::default()
        };
        let config = OpenAIConfig::from_settings(&settings).unwrap();
        assert_eq!(config.api_key, "sk-live");
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn test_unstructured_error_body_kept() {
        let err = error_for_status(StatusCode::BAD_GATEWAY, "  upstream down \n");
        assert_eq!(
            err,
            LlmError::Api {
                status: 502,
                message: "upstream down".into()
            }
        );
    }
}

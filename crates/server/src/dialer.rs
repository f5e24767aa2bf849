//! Twilio REST client
//!
//! Places outbound calls and runs the pre-flight connection check used by the
//! `call` command. Only the three endpoints below are used:
//!
//! - `POST {api_base}/Accounts/{sid}/Calls.json`
//! - `GET  {api_base}/Accounts/{sid}.json`
//! - `GET  {api_base}/Accounts/{sid}/IncomingPhoneNumbers.json`

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use voice_caller_config::TwilioConfig;

/// Dialer errors
#[derive(Error, Debug)]
pub enum DialerError {
    #[error("Dialer configuration error: {0}")]
    Config(String),

    #[error("Twilio API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for DialerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DialerError::InvalidResponse(err.to_string())
        } else {
            DialerError::Network(err.to_string())
        }
    }
}

/// A call resource as returned on creation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallRecord {
    pub sid: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountInfo {
    pub sid: String,
    pub friendly_name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// A number owned by the account
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncomingNumber {
    pub phone_number: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingNumberPage {
    #[serde(default)]
    incoming_phone_numbers: Vec<IncomingNumber>,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
}

/// Result of the pre-flight check
#[derive(Debug, Clone)]
pub struct ConnectionCheck {
    pub account: AccountInfo,
    pub numbers: Vec<IncomingNumber>,
    /// Whether the configured caller ID is one of `numbers`
    pub caller_number_found: bool,
}

/// Minimal Twilio REST client
pub struct TwilioClient {
    api_base: String,
    account_sid: String,
    auth_token: String,
    client: Client,
}

impl TwilioClient {
    pub fn new(
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Result<Self, DialerError> {
        let account_sid = account_sid.into();
        let auth_token = auth_token.into();
        if account_sid.trim().is_empty() || auth_token.trim().is_empty() {
            return Err(DialerError::Config(
                "account SID and auth token are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DialerError::Config(e.to_string()))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            client,
        })
    }

    pub fn from_settings(settings: &TwilioConfig) -> Result<Self, DialerError> {
        let sid = settings.account_sid.clone().unwrap_or_default();
        let token = settings
            .auth_token
            .as_ref()
            .map(|t| t.expose().to_string())
            .unwrap_or_default();
        Self::new(settings.api_base.clone(), sid, token)
    }

    pub fn account_sid(&self) -> &str {
        &self.account_sid
    }

    fn account_url(&self, suffix: &str) -> String {
        format!("{}/Accounts/{}{}", self.api_base, self.account_sid, suffix)
    }

    /// Place a call; Twilio POSTs to `url` once the callee answers
    pub async fn create_call(
        &self,
        to: &str,
        from: &str,
        url: &str,
    ) -> Result<CallRecord, DialerError> {
        tracing::info!(to, from, url, "Creating outbound call");

        let response = self
            .client
            .post(self.account_url("/Calls.json"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Url", url), ("Method", "POST")])
            .send()
            .await?;

        let record: CallRecord = parse(response).await?;
        tracing::info!(call_sid = %record.sid, status = %record.status, "Outbound call created");
        Ok(record)
    }

    pub async fn fetch_account(&self) -> Result<AccountInfo, DialerError> {
        let response = self
            .client
            .get(self.account_url(".json"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        parse(response).await
    }

    pub async fn list_incoming_numbers(
        &self,
        limit: u32,
    ) -> Result<Vec<IncomingNumber>, DialerError> {
        let response = self
            .client
            .get(self.account_url("/IncomingPhoneNumbers.json"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .query(&[("PageSize", limit)])
            .send()
            .await?;
        let page: IncomingNumberPage = parse(response).await?;
        Ok(page.incoming_phone_numbers)
    }

    /// Confirm the credentials work and `caller` belongs to the account
    pub async fn check_connection(&self, caller: &str) -> Result<ConnectionCheck, DialerError> {
        let account = self.fetch_account().await?;
        let numbers = self.list_incoming_numbers(5).await?;
        let caller_number_found = numbers.iter().any(|n| n.phone_number == caller);

        tracing::debug!(
            account = %account.friendly_name,
            numbers = numbers.len(),
            caller_number_found,
            "Twilio connection checked"
        );

        Ok(ConnectionCheck {
            account,
            numbers,
            caller_number_found,
        })
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, DialerError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<TwilioErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| body.trim().to_string());
        return Err(DialerError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| DialerError::InvalidResponse(e.to_string()))
}

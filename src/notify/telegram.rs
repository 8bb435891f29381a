use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{MessageTransport, SendError};
use crate::format::MarkupDialect;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Bot API `sendMessage` transport.
#[derive(Clone)]
pub struct TelegramTransport {
    client: Client,
    token: String,
    api_base: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiReply {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ReplyParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl TelegramTransport {
    pub fn new(token: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(SEND_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            token: token.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
        })
    }

    /// Point at another Bot API server (self-hosted or a test double).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

/// Map a Bot API answer onto the delivery outcome.
pub fn classify_response(status: StatusCode, body: &str) -> Result<(), SendError> {
    if status.is_success() {
        return Ok(());
    }
    let reply: ApiReply = serde_json::from_str(body).unwrap_or_default();
    let description = reply
        .description
        .unwrap_or_else(|| format!("HTTP {status}"));

    if status == StatusCode::TOO_MANY_REQUESTS {
        let secs = reply
            .parameters
            .and_then(|p| p.retry_after)
            .unwrap_or(1);
        return Err(SendError::RateLimited {
            retry_after: Duration::from_secs(secs),
        });
    }
    if status == StatusCode::BAD_REQUEST
        && description.to_ascii_lowercase().contains("message is too long")
    {
        return Err(SendError::TooLong);
    }
    if status.is_server_error() {
        return Err(SendError::Transient(description));
    }
    Err(SendError::Rejected(description))
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send(&self, channel: &str, text: &str, dialect: MarkupDialect) -> Result<(), SendError> {
        let mut payload = json!({
            "chat_id": channel,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(mode) = dialect.parse_mode() {
            payload["parse_mode"] = json!(mode);
        }

        let resp = self
            .client
            .post(self.send_url())
            .json(&payload)
            .send()
            .await
            // never let the token-bearing URL reach the logs
            .map_err(|e| SendError::Transient(e.without_url().to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        classify_response(status, &body)
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

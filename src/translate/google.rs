use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{TranslateBackend, TranslateError};

const ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Keyless Google endpoint (`client=gtx`), auto-detecting the source language.
pub struct GoogleBackend {
    http: Client,
}

impl GoogleBackend {
    pub fn new() -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { http })
    }
}

/// Response shape: `[[["translated", "source", ...], ...], ...]`; the
/// translation is the concatenation of the first string of each segment.
pub(crate) fn parse_response(body: &serde_json::Value) -> Result<String, TranslateError> {
    let segments = body
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| TranslateError::Malformed("missing segment list".into()))?;
    let out: String = segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(|s| s.as_str()))
        .collect();
    if out.trim().is_empty() {
        return Err(TranslateError::Malformed("no translated segments".into()));
    }
    Ok(out)
}

#[async_trait]
impl TranslateBackend for GoogleBackend {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslateError> {
        let resp = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target_lang),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TranslateError::Quota(status.to_string()));
        }
        if !status.is_success() {
            return Err(TranslateError::Status(status));
        }
        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_segments() {
        let body = json!([[["Путин объявил ", "Putin announces ", null], ["новые санкции", "new sanctions", null]], null, "en"]);
        assert_eq!(parse_response(&body).unwrap(), "Путин объявил новые санкции");
    }

    #[test]
    fn rejects_unexpected_shapes() {
        assert!(parse_response(&json!({"error": "nope"})).is_err());
        assert!(parse_response(&json!([[]])).is_err());
    }
}

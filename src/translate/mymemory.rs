use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{TranslateBackend, TranslateError};

const ENDPOINT: &str = "https://api.mymemory.translated.net/get";
const SOURCE_LANG: &str = "en";

/// MyMemory free API. It needs an explicit source language; the feeds we
/// watch publish in English.
pub struct MyMemoryBackend {
    http: Client,
}

#[derive(Debug, Deserialize)]
struct Resp {
    #[serde(rename = "responseData")]
    response_data: Option<RespData>,
    #[serde(rename = "responseStatus")]
    response_status: serde_json::Value, // number or string, depending on the error path
    #[serde(rename = "responseDetails", default)]
    response_details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RespData {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

impl MyMemoryBackend {
    pub fn new() -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { http })
    }
}

fn parse_response(body: &str) -> Result<String, TranslateError> {
    let resp: Resp =
        serde_json::from_str(body).map_err(|e| TranslateError::Malformed(e.to_string()))?;
    let status = match &resp.response_status {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        serde_json::Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    };
    let text = resp
        .response_data
        .and_then(|d| d.translated_text)
        .unwrap_or_default();
    if status == 429 || text.starts_with("MYMEMORY WARNING") {
        return Err(TranslateError::Quota(
            resp.response_details.unwrap_or_else(|| text.clone()),
        ));
    }
    if status != 200 || text.trim().is_empty() {
        return Err(TranslateError::Malformed(format!(
            "status {status}: {}",
            resp.response_details.unwrap_or_default()
        )));
    }
    Ok(html_escape::decode_html_entities(&text).to_string())
}

#[async_trait]
impl TranslateBackend for MyMemoryBackend {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslateError> {
        let langpair = format!("{SOURCE_LANG}|{target_lang}");
        let resp = self
            .http
            .get(ENDPOINT)
            .query(&[("q", text), ("langpair", langpair.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TranslateError::Status(resp.status()));
        }
        let body = resp.text().await?;
        parse_response(&body)
    }

    fn name(&self) -> &'static str {
        "mymemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_translated_text() {
        let body = r#"{"responseData":{"translatedText":"Газ &amp; нефть","match":0.9},"responseStatus":200,"responseDetails":""}"#;
        assert_eq!(parse_response(body).unwrap(), "Газ & нефть");
    }

    #[test]
    fn quota_warning_is_an_error() {
        let body = r#"{"responseData":{"translatedText":"MYMEMORY WARNING: YOU USED ALL AVAILABLE FREE TRANSLATIONS FOR TODAY"},"responseStatus":"429","responseDetails":"quota"}"#;
        assert!(matches!(parse_response(body), Err(TranslateError::Quota(_))));
    }

    #[test]
    fn error_status_is_an_error() {
        let body = r#"{"responseData":{"translatedText":"INVALID LANGUAGE PAIR"},"responseStatus":"403","responseDetails":"bad pair"}"#;
        assert!(matches!(parse_response(body), Err(TranslateError::Malformed(_))));
    }
}

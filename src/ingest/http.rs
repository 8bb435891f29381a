// src/ingest/http.rs
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::ingest::feed::parse_feed;
use crate::ingest::types::{CandidateEntry, FeedClient, Source};

/// Some publishers reject non-browser agents outright.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(25);

/// Plain GET + parse. Non-200 answers are errors; no retry inside a cycle.
#[derive(Clone)]
pub struct HttpFeedClient {
    client: Client,
}

impl HttpFeedClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self, source: &Source) -> Result<Vec<CandidateEntry>> {
        let resp = self
            .client
            .get(source.url.trim())
            .send()
            .await
            .with_context(|| format!("GET {}", source.url))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            bail!("GET {} answered {status}", source.url);
        }

        let body = resp
            .text()
            .await
            .with_context(|| format!("reading body of {}", source.url))?;
        parse_feed(&body, source).with_context(|| format!("parsing feed {}", source.name))
    }
}

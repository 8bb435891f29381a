// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A configured feed endpoint. Loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub name: String, // label shown in delivered messages
    pub url: String,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// One parsed feed item, not yet filtered or translated. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    pub title: String,
    pub link: String,
    pub summary: String, // already extracted (first sentence or truncated)
    pub source: Source,
}

#[async_trait::async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch and parse one source. Errors are per-source and never fatal to a cycle.
    async fn fetch(&self, source: &Source) -> Result<Vec<CandidateEntry>>;
}

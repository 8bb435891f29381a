// src/config/watchlist.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::dedup::IdentityScheme;
use crate::ingest::types::Source;
use crate::relevance::{KeywordSet, RelevanceFilter};

pub const ENV_WATCHLIST_PATH: &str = "WATCHLIST_CONFIG_PATH";
pub const DEFAULT_WATCHLIST_PATH: &str = "config/watchlist.toml";

/// Feeds to poll and the keyword cluster that decides what gets forwarded.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistConfig {
    pub sources: Vec<Source>,
    pub keywords: Keywords,
    /// Match keywords against "title + summary" instead of the title alone.
    #[serde(default)]
    pub match_summary: bool,
    #[serde(default)]
    pub identity: IdentityScheme,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Keywords {
    pub patterns: Vec<String>,
}

impl WatchlistConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: WatchlistConfig = toml::from_str(s).context("parsing watchlist TOML")?;
        for src in &mut cfg.sources {
            src.name = src.name.trim().to_string();
            src.url = src.url.trim().to_string();
        }
        cfg.sources.retain(|s| !s.url.is_empty());
        if cfg.sources.is_empty() {
            bail!("watchlist has no sources");
        }
        for src in &cfg.sources {
            url::Url::parse(&src.url)
                .with_context(|| format!("source `{}` has an invalid url", src.name))?;
        }
        // compile once here so a bad pattern fails at load, not mid-cycle
        KeywordSet::new(&cfg.keywords.patterns)?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading watchlist from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// $WATCHLIST_CONFIG_PATH when set, otherwise `config/watchlist.toml`.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_WATCHLIST_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_WATCHLIST_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        Self::load_from(Path::new(DEFAULT_WATCHLIST_PATH))
    }

    pub fn relevance_filter(&self) -> Result<RelevanceFilter> {
        let keywords = KeywordSet::new(&self.keywords.patterns)?;
        Ok(RelevanceFilter::new(keywords, self.match_summary))
    }
}

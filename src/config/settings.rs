// src/config/settings.rs
//! Process settings read from the environment (after `.env` is loaded).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::dedup::DEFAULT_MAX_RECORDS;
use crate::format::MarkupDialect;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1800;
pub const DEFAULT_SELF_PING_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_STORE_PATH: &str = "state/seen.json";
pub const DEFAULT_TARGET_LANG: &str = "ru";
pub const DEFAULT_FETCH_WORKERS: usize = 4;
pub const DEFAULT_MAX_PER_CYCLE: usize = 8;
pub const DEFAULT_SEND_DELAY_MS: u64 = 1200;
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct Settings {
    pub telegram_token: String,
    pub channels: Vec<String>,
    pub dry_run: bool,
    pub self_ping_url: Option<String>,
    pub self_ping_interval: Duration,
    pub poll_interval: Duration,
    pub store_path: PathBuf,
    pub max_records: usize,
    pub target_lang: String,
    pub dialect: MarkupDialect,
    pub fetch_workers: usize,
    pub max_per_cycle: usize,
    pub send_delay: Duration,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; tests pass a map instead of touching the env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let Some(telegram_token) = get("TELEGRAM_TOKEN") else {
            bail!("TELEGRAM_TOKEN is not set");
        };
        let channels = parse_channels(&get("TELEGRAM_CHANNELS").unwrap_or_default());
        if channels.is_empty() {
            bail!("TELEGRAM_CHANNELS must name at least one channel");
        }

        let dialect = match get("MARKUP_DIALECT") {
            Some(raw) => MarkupDialect::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(target: "config", error = %e, "falling back to html");
                MarkupDialect::Html
            }),
            None => MarkupDialect::default(),
        };

        Ok(Self {
            telegram_token,
            channels,
            dry_run: get("DRY_RUN").is_some_and(|v| parse_flag(&v)),
            self_ping_url: get("SELF_PING_URL"),
            self_ping_interval: Duration::from_secs(
                number_or(&get, "SELF_PING_INTERVAL_SECS", DEFAULT_SELF_PING_INTERVAL_SECS).max(1),
            ),
            poll_interval: Duration::from_secs(
                number_or(&get, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS).max(1),
            ),
            store_path: PathBuf::from(get("DEDUP_STORE_PATH").unwrap_or_else(|| DEFAULT_STORE_PATH.into())),
            max_records: number_or(&get, "DEDUP_MAX_RECORDS", DEFAULT_MAX_RECORDS).max(1),
            target_lang: get("TARGET_LANG").unwrap_or_else(|| DEFAULT_TARGET_LANG.into()),
            dialect,
            fetch_workers: number_or(&get, "FETCH_WORKERS", DEFAULT_FETCH_WORKERS).max(1),
            max_per_cycle: number_or(&get, "MAX_PER_CYCLE", DEFAULT_MAX_PER_CYCLE).max(1),
            send_delay: Duration::from_millis(number_or(&get, "SEND_DELAY_MS", DEFAULT_SEND_DELAY_MS)),
            port: number_or(&get, "PORT", DEFAULT_PORT),
        })
    }
}

fn parse_channels(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ch in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if !out.iter().any(|c| c == ch) {
            out.push(ch.to_string());
        }
    }
    out
}

fn parse_flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn number_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(target: "config", key, value = %raw, %default, "not a number, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply() {
        let s = Settings::from_lookup(lookup(&[
            ("TELEGRAM_TOKEN", "123:abc"),
            ("TELEGRAM_CHANNELS", "@news"),
        ]))
        .unwrap();
        assert_eq!(s.channels, vec!["@news"]);
        assert!(!s.dry_run);
        assert_eq!(s.poll_interval, Duration::from_secs(1800));
        assert_eq!(s.max_per_cycle, 8);
        assert_eq!(s.max_records, 3000);
        assert_eq!(s.dialect, MarkupDialect::Html);
        assert_eq!(s.send_delay, Duration::from_millis(1200));
        assert_eq!(s.target_lang, "ru");
        assert!(s.self_ping_url.is_none());
    }

    #[test]
    fn missing_token_or_channels_is_fatal() {
        assert!(Settings::from_lookup(lookup(&[("TELEGRAM_CHANNELS", "@a")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("TELEGRAM_TOKEN", "  ")])).is_err());
        assert!(Settings::from_lookup(lookup(&[
            ("TELEGRAM_TOKEN", "t"),
            ("TELEGRAM_CHANNELS", " , ,"),
        ]))
        .is_err());
    }

    #[test]
    fn channels_are_trimmed_and_deduplicated() {
        let s = Settings::from_lookup(lookup(&[
            ("TELEGRAM_TOKEN", "t"),
            ("TELEGRAM_CHANNELS", "@a, @b ,@a,,-100123"),
        ]))
        .unwrap();
        assert_eq!(s.channels, vec!["@a", "@b", "-100123"]);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let s = Settings::from_lookup(lookup(&[
            ("TELEGRAM_TOKEN", "t"),
            ("TELEGRAM_CHANNELS", "@a"),
            ("POLL_INTERVAL_SECS", "soon"),
            ("MAX_PER_CYCLE", "0"),
            ("DRY_RUN", "TRUE"),
            ("MARKUP_DIALECT", "markdown"),
        ]))
        .unwrap();
        assert_eq!(s.poll_interval, Duration::from_secs(1800));
        assert_eq!(s.max_per_cycle, 1);
        assert!(s.dry_run);
        assert_eq!(s.dialect, MarkupDialect::Markdown);
    }
}

// tests/config_env.rs
//
// Environment-driven configuration. Every test mutates process env, so they
// run serially.

use std::env;
use std::time::Duration;

use serial_test::serial;

use watchlist_relay::config::watchlist::ENV_WATCHLIST_PATH;
use watchlist_relay::config::{Settings, WatchlistConfig};
use watchlist_relay::dedup::IdentityScheme;
use watchlist_relay::format::MarkupDialect;

const KEYS: [&str; 8] = [
    "TELEGRAM_TOKEN",
    "TELEGRAM_CHANNELS",
    "DRY_RUN",
    "POLL_INTERVAL_SECS",
    "MARKUP_DIALECT",
    "SELF_PING_URL",
    "DEDUP_STORE_PATH",
    "PORT",
];

fn clear_env() {
    for k in KEYS {
        env::remove_var(k);
    }
    env::remove_var(ENV_WATCHLIST_PATH);
}

#[test]
#[serial]
fn settings_from_env() {
    clear_env();
    env::set_var("TELEGRAM_TOKEN", "123:abc");
    env::set_var("TELEGRAM_CHANNELS", "@one,@two");
    env::set_var("DRY_RUN", "1");
    env::set_var("POLL_INTERVAL_SECS", "60");
    env::set_var("MARKUP_DIALECT", "Markdown");
    env::set_var("SELF_PING_URL", "https://relay.example/health");
    env::set_var("DEDUP_STORE_PATH", "/tmp/relay/seen.json");
    env::set_var("PORT", "9000");

    let s = Settings::from_env().expect("settings");
    assert_eq!(s.telegram_token, "123:abc");
    assert_eq!(s.channels, vec!["@one", "@two"]);
    assert!(s.dry_run);
    assert_eq!(s.poll_interval, Duration::from_secs(60));
    assert_eq!(s.dialect, MarkupDialect::Markdown);
    assert_eq!(s.self_ping_url.as_deref(), Some("https://relay.example/health"));
    assert_eq!(s.store_path.to_str(), Some("/tmp/relay/seen.json"));
    assert_eq!(s.port, 9000);
    clear_env();
}

#[test]
#[serial]
fn missing_token_fails_fast() {
    clear_env();
    env::set_var("TELEGRAM_CHANNELS", "@one");
    let err = Settings::from_env().unwrap_err();
    assert!(err.to_string().contains("TELEGRAM_TOKEN"));
    clear_env();
}

#[test]
#[serial]
fn watchlist_path_from_env() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("list.toml");
    std::fs::write(
        &path,
        r#"
match_summary = true
identity = "title"

[[sources]]
name = "Only"
url = "https://only.example/rss"

[keywords]
patterns = ['\bkremlin\b']
"#,
    )
    .unwrap();
    env::set_var(ENV_WATCHLIST_PATH, &path);

    let cfg = WatchlistConfig::load_default().expect("watchlist");
    assert_eq!(cfg.sources.len(), 1);
    assert!(cfg.match_summary);
    assert_eq!(cfg.identity, IdentityScheme::Title);

    env::set_var(ENV_WATCHLIST_PATH, dir.path().join("missing.toml"));
    assert!(WatchlistConfig::load_default().is_err());
    clear_env();
}

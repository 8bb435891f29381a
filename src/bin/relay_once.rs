//! Runs a single cycle in dry-run mode and prints what would have been sent.
//! Uses the real feeds and translators; nothing reaches a channel.

use std::sync::Arc;

use watchlist_relay::{
    config::{Settings, WatchlistConfig},
    dedup::DedupStore,
    format::MessageFormatter,
    ingest::http::HttpFeedClient,
    notify::{ChannelMux, TelegramTransport},
    scheduler::{Pipeline, PipelineCfg},
    translate::Translator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    // token and channels only label the dry-run output here
    let settings = Settings::from_lookup(|key| match std::env::var(key).ok() {
        None if key == "TELEGRAM_TOKEN" => Some("dry-run".into()),
        None if key == "TELEGRAM_CHANNELS" => Some("@dry-run".into()),
        v => v,
    })?;
    let watchlist = WatchlistConfig::load_default()?;

    let mux = ChannelMux::new(
        Arc::new(TelegramTransport::new(settings.telegram_token.clone())?),
        settings.channels.clone(),
        MessageFormatter::new(settings.dialect),
    )
    .with_dry_run(true);

    let pipeline = Pipeline::new(
        watchlist.sources.clone(),
        Arc::new(HttpFeedClient::new()?),
        watchlist.relevance_filter()?,
        Arc::new(DedupStore::in_memory(watchlist.identity, settings.max_records)),
        Translator::with_default_backends(settings.target_lang.clone())?,
        mux,
        PipelineCfg {
            fetch_workers: settings.fetch_workers,
            max_per_cycle: settings.max_per_cycle,
            ..PipelineCfg::default()
        },
    );

    let stats = pipeline.run_cycle().await;
    println!("{stats:?}");
    Ok(())
}

//! Watchlist relay: polls the configured feeds, forwards keyword matches to
//! the messaging channels, and serves a liveness endpoint for the host.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use watchlist_relay::{
    api::{self, AppState},
    config::{Settings, WatchlistConfig},
    dedup::DedupStore,
    format::MessageFormatter,
    ingest::http::HttpFeedClient,
    metrics::Metrics,
    notify::{ChannelMux, TelegramTransport},
    scheduler::{spawn_self_ping, Pipeline, PipelineCfg},
    translate::Translator,
};

/// `LOG_FORMAT=json` for JSON lines, compact text otherwise. `RUST_LOG` filters.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::from_env().context("configuration")?;
    let watchlist = WatchlistConfig::load_default()?;
    let filter = watchlist.relevance_filter()?;
    if filter.keywords().is_empty() {
        tracing::warn!("watchlist has no keywords; nothing will be forwarded");
    }

    let metrics = match Metrics::init() {
        Ok(m) => Some(m.handle),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "metrics disabled");
            None
        }
    };

    let store = Arc::new(
        DedupStore::open(&settings.store_path, watchlist.identity, settings.max_records).await,
    );
    let formatter = MessageFormatter::new(settings.dialect);
    let transport = Arc::new(TelegramTransport::new(settings.telegram_token.clone())?);
    let mux = ChannelMux::new(transport, settings.channels.clone(), formatter)
        .with_dry_run(settings.dry_run);

    let pipeline = Pipeline::new(
        watchlist.sources.clone(),
        Arc::new(HttpFeedClient::new()?),
        filter,
        store.clone(),
        Translator::with_default_backends(settings.target_lang.clone())?,
        mux,
        PipelineCfg {
            interval: settings.poll_interval,
            fetch_workers: settings.fetch_workers,
            max_per_cycle: settings.max_per_cycle,
            send_delay: settings.send_delay,
        },
    );

    let source_count = pipeline.sources().len();
    tracing::info!(
        sources = source_count,
        channels = ?settings.channels,
        seen = store.len(),
        identity = ?store.scheme(),
        dry_run = settings.dry_run,
        interval_secs = settings.poll_interval.as_secs(),
        "relay starting"
    );
    let pipeline = pipeline.spawn();
    let _ping = match settings.self_ping_url.clone() {
        Some(url) => Some(spawn_self_ping(url, settings.self_ping_interval)?),
        None => None,
    };

    let app = api::router(AppState {
        channels: settings.channels.clone(),
        source_count,
        metrics,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "liveness endpoint listening");

    // the cycle loop never returns; if it dies, stop answering health checks
    tokio::select! {
        served = axum::serve(listener, app).into_future() => served.context("http server")?,
        ended = pipeline => match ended {
            Ok(()) => anyhow::bail!("pipeline task stopped"),
            Err(e) => anyhow::bail!("pipeline task failed: {e}"),
        },
    }
    Ok(())
}

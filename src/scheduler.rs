// src/scheduler.rs
//! Fetch → dedup check → filter → translate → format → deliver → record,
//! once per interval, forever.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dedup::DedupStore;
use crate::format::MessageParts;
use crate::ingest::{
    fetch_all,
    types::{CandidateEntry, FeedClient, Source},
};
use crate::notify::{ChannelMux, DeliveryReport};
use crate::relevance::RelevanceFilter;
use crate::translate::Translator;

#[derive(Clone, Copy, Debug)]
pub struct PipelineCfg {
    pub interval: Duration,
    pub fetch_workers: usize,
    /// Entries forwarded per cycle; the rest wait for the next cycle.
    pub max_per_cycle: usize,
    /// Pause between two deliveries.
    pub send_delay: Duration,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1800),
            fetch_workers: 4,
            max_per_cycle: 8,
            send_delay: Duration::from_millis(1200),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub fetched: usize,
    pub duplicates: usize,
    pub filtered_out: usize,
    pub forwarded: usize,
    pub failed: usize,
    pub deferred: usize,
    /// Delivered but the store write failed; may be forwarded again.
    pub unrecorded: usize,
}

pub struct Pipeline {
    sources: Vec<Source>,
    client: Arc<dyn FeedClient>,
    filter: RelevanceFilter,
    store: Arc<DedupStore>,
    translator: Translator,
    mux: ChannelMux,
    cfg: PipelineCfg,
}

impl Pipeline {
    pub fn new(
        sources: Vec<Source>,
        client: Arc<dyn FeedClient>,
        filter: RelevanceFilter,
        store: Arc<DedupStore>,
        translator: Translator,
        mux: ChannelMux,
        cfg: PipelineCfg,
    ) -> Self {
        Self {
            sources,
            client,
            filter,
            store,
            translator,
            mux,
            cfg,
        }
    }

    pub fn store(&self) -> &Arc<DedupStore> {
        &self.store
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// One full pass over every source. Never fails; problems are logged and counted.
    pub async fn run_cycle(&self) -> CycleStats {
        let entries = fetch_all(self.client.as_ref(), &self.sources, self.cfg.fetch_workers).await;
        let mut stats = CycleStats {
            fetched: entries.len(),
            ..CycleStats::default()
        };
        // same article syndicated by two feeds within one cycle
        let mut this_cycle = HashSet::new();

        for entry in entries {
            let id = self.store.identity(&entry);
            if self.store.is_seen(&id) || this_cycle.contains(&id) {
                stats.duplicates += 1;
                counter!("relay_entries_duplicate_total").increment(1);
                continue;
            }

            let Some(pattern) = self.filter.matched_pattern(&entry) else {
                stats.filtered_out += 1;
                tracing::debug!(target: "pipeline", source = %entry.source.name, title = %entry.title, "no keyword match");
                continue;
            };
            // claimed by the first matching copy, not the first copy seen
            this_cycle.insert(id.clone());
            counter!("relay_entries_matched_total").increment(1);

            if stats.forwarded + stats.failed >= self.cfg.max_per_cycle {
                stats.deferred += 1;
                continue;
            }
            if stats.forwarded + stats.failed > 0 && !self.cfg.send_delay.is_zero() {
                tokio::time::sleep(self.cfg.send_delay).await;
            }

            tracing::info!(target: "pipeline", source = %entry.source.name, identity = %id, pattern, "forwarding");
            let report = self.translate_and_deliver(&entry).await;
            if !report.any_delivered() {
                stats.failed += 1;
                continue;
            }
            stats.forwarded += 1;

            if let Err(e) = self.store.mark_seen(&id, chrono::Utc::now()).await {
                stats.unrecorded += 1;
                tracing::error!(target: "pipeline", identity = %id, error = %format!("{e:#}"), "delivered but not recorded");
            }
        }

        gauge!("relay_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            target: "pipeline",
            fetched = stats.fetched,
            duplicates = stats.duplicates,
            filtered_out = stats.filtered_out,
            forwarded = stats.forwarded,
            failed = stats.failed,
            deferred = stats.deferred,
            "cycle done"
        );
        stats
    }

    async fn translate_and_deliver(&self, entry: &CandidateEntry) -> DeliveryReport {
        let title = self.translator.translate(&entry.title).await;
        let summary = self.translator.translate(&entry.summary).await;
        self.mux
            .deliver(&MessageParts {
                source: &entry.source.name,
                title: &title,
                summary: &summary,
                link: &entry.link,
            })
            .await
    }

    /// First cycle right away, then one per interval. A slow cycle delays the
    /// next tick instead of producing a burst of catch-up cycles.
    pub async fn run_forever(self) {
        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run_forever())
    }
}

/// Keep-alive for hosts that idle a service nobody calls.
pub fn spawn_self_ping(url: String, every: Duration) -> anyhow::Result<JoinHandle<()>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    Ok(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // skip the immediate tick; the server just started
        loop {
            ticker.tick().await;
            match client.get(&url).send().await {
                Ok(resp) => tracing::debug!(target: "self_ping", status = %resp.status(), "ping"),
                Err(e) => tracing::warn!(target: "self_ping", error = %e.without_url(), "ping failed"),
            }
        }
    }))
}

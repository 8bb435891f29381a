// src/metrics.rs
use anyhow::Context;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register series descriptions.
    /// Fails if another recorder is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("relay_entries_fetched_total", "Entries parsed from all feeds");
        describe_counter!("relay_entries_matched_total", "Unseen entries that passed the keyword filter");
        describe_counter!("relay_entries_duplicate_total", "Entries skipped as already seen");
        describe_counter!("relay_source_errors_total", "Feed fetches that failed or did not parse");
        describe_counter!("relay_messages_delivered_total", "Messages accepted by a channel");
        describe_counter!("relay_delivery_failures_total", "Channel deliveries given up on");
        describe_counter!("relay_translate_fallbacks_total", "Translations served by a fallback backend");
        describe_counter!("relay_translate_failures_total", "Texts forwarded untranslated");
        describe_gauge!("relay_last_cycle_ts", "Unix time the last cycle finished");
        describe_histogram!("relay_parse_ms", "Feed parse time in milliseconds");

        Ok(Self { handle })
    }
}

// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod config;
pub mod dedup;
pub mod format;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod relevance;
pub mod scheduler;
pub mod translate;

pub use crate::api::router;
pub use crate::scheduler::{CycleStats, Pipeline, PipelineCfg};

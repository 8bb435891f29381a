// src/notify/mod.rs
//! Delivery to one or more channels.
//!
//! Each channel is attempted independently and sequentially; a failure on one
//! channel is logged and never stops the others. Nothing here returns an error
//! to the pipeline: the outcome is a per-channel report.

pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;

use crate::format::{MessageFormatter, MessageParts};

pub use telegram::TelegramTransport;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("message too long")]
    TooLong,
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Sends one text to one channel.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(
        &self,
        channel: &str,
        text: &str,
        dialect: crate::format::MarkupDialect,
    ) -> Result<(), SendError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    /// Retries after the first attempt (rate limits and transient failures).
    pub max_retries: u32,
    /// Backoff added on retry `n` is `backoff_base * 2^(n-1)`.
    pub backoff_base: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl DeliveryPolicy {
    fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    DryRun,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: String,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub channels: Vec<ChannelReport>,
}

impl DeliveryReport {
    /// At least one channel got the message (dry runs count as delivered).
    pub fn any_delivered(&self) -> bool {
        self.channels
            .iter()
            .any(|c| !matches!(c.outcome, DeliveryOutcome::Failed { .. }))
    }

    pub fn all_delivered(&self) -> bool {
        !self.channels.is_empty()
            && self
                .channels
                .iter()
                .all(|c| !matches!(c.outcome, DeliveryOutcome::Failed { .. }))
    }
}

/// Fans one message out over every configured channel.
pub struct ChannelMux {
    transport: Arc<dyn MessageTransport>,
    channels: Vec<String>,
    formatter: MessageFormatter,
    policy: DeliveryPolicy,
    dry_run: bool,
}

impl ChannelMux {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        channels: Vec<String>,
        formatter: MessageFormatter,
    ) -> Self {
        Self {
            transport,
            channels,
            formatter,
            policy: DeliveryPolicy::default(),
            dry_run: false,
        }
    }

    pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Log messages instead of sending them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Render `parts` once and send the result to every channel.
    pub async fn deliver(&self, parts: &MessageParts<'_>) -> DeliveryReport {
        let message = self.formatter.format(parts);
        let mut report = DeliveryReport::default();
        for channel in &self.channels {
            let outcome = if self.dry_run {
                tracing::info!(target: "notify", %channel, "dry run, not sent:\n{message}");
                DeliveryOutcome::DryRun
            } else {
                self.deliver_one(channel, parts, &message).await
            };
            match &outcome {
                DeliveryOutcome::Delivered { attempts } => {
                    counter!("relay_messages_delivered_total").increment(1);
                    tracing::info!(target: "notify", %channel, attempts, transport = self.transport.name(), "delivered");
                }
                DeliveryOutcome::Failed { reason } => {
                    counter!("relay_delivery_failures_total").increment(1);
                    tracing::error!(target: "notify", %channel, %reason, "delivery failed");
                }
                DeliveryOutcome::DryRun => {}
            }
            report.channels.push(ChannelReport {
                channel: channel.clone(),
                outcome,
            });
        }
        report
    }

    async fn deliver_one(&self, channel: &str, parts: &MessageParts<'_>, message: &str) -> DeliveryOutcome {
        let dialect = self.formatter.dialect();
        let mut text = message.to_string();
        let mut attempts: u32 = 0;
        let mut retries: u32 = 0;
        let mut shortened = false;

        loop {
            attempts += 1;
            match self.transport.send(channel, &text, dialect).await {
                Ok(()) => return DeliveryOutcome::Delivered { attempts },
                Err(SendError::TooLong) if !shortened => {
                    // our limit and the server's count disagree; cut deeper once
                    shortened = true;
                    let target = text.chars().count() * 3 / 4;
                    text = MessageFormatter::with_limit(dialect, target).format(parts);
                    tracing::warn!(target: "notify", %channel, chars = target, "message too long, retrying shortened");
                }
                Err(SendError::RateLimited { retry_after }) if retries < self.policy.max_retries => {
                    retries += 1;
                    let wait = retry_after + self.policy.backoff(retries);
                    tracing::warn!(target: "notify", %channel, retry = retries, wait_ms = wait.as_millis() as u64, "rate limited");
                    tokio::time::sleep(wait).await;
                }
                Err(SendError::Transient(e)) if retries < self.policy.max_retries => {
                    retries += 1;
                    let wait = self.policy.backoff(retries);
                    tracing::warn!(target: "notify", %channel, retry = retries, error = %e, "transient send failure");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    return DeliveryOutcome::Failed {
                        reason: format!("{e} after {attempts} attempt(s)"),
                    }
                }
            }
        }
    }
}

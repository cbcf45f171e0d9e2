// src/notify/mod.rs
pub mod antiflutter;
pub mod discord;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// An admitted detection, ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub amount: Option<f64>,
    pub url: String,
    pub text: String,
    pub observed_at: DateTime<Utc>,
}

/// Outbound alert channel. One attempt per event; errors are reported, not retried.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ev: &AlertEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Fallback channel when no webhook is configured: the alert only goes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, ev: &AlertEvent) -> Result<()> {
        tracing::info!(
            target: "notify",
            amount = ?ev.amount,
            url = %ev.url,
            observed_at = %ev.observed_at.to_rfc3339(),
            "rain alert (log only)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

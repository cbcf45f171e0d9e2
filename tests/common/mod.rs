// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rain_watch::{AlertEvent, Notifier};

pub const SITE: &str = "https://bandit.camp";
pub const PHRASE: &str = "Join now to get free scrap based on your play amount";

/// Notifier that keeps every alert it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AlertEvent>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every send fails, like an unreachable webhook.
    pub fn failing() -> Arc<Self> {
        let n = Self::default();
        n.fail.store(true, Ordering::SeqCst);
        Arc::new(n)
    }

    pub fn sent(&self) -> Vec<AlertEvent> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, ev: &AlertEvent) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("webhook unreachable");
        }
        self.sent.lock().push(ev.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub fn banner(amount: &str) -> String {
    format!("RAIN! {PHRASE} · share {amount}")
}

// src/pipeline.rs
//! # Event Pipeline
//! observe → extract → eligibility → dedup → amount policy → cooldown → deliver.
//!
//! Everything up to and including the cooldown check-and-set runs under one
//! lock, so two detections of the same occurrence (push and poll) can never both
//! pass. Delivery runs outside the lock and is attempted once.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::amount::{AmountExtractor, DEFAULT_AMOUNT_KEYWORD};
use crate::dedup::{Deduplicator, DEFAULT_DUPLICATE_WINDOW};
use crate::event::{CandidateEvent, RawDetection};
use crate::fingerprint::{
    fingerprint_detection, is_admissible, short_id, DEFAULT_MIN_FINGERPRINT_LEN,
};
use crate::notify::antiflutter::{AntiFlutter, DEFAULT_COOLDOWN};
use crate::notify::{AlertEvent, Notifier};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub duplicate_window: Duration,
    pub cooldown: Duration,
    pub min_fingerprint_len: usize,
    pub amount_keyword: String,
    /// Drop candidates whose amount is missing or `<= 0` before the cooldown.
    pub require_positive_amount: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
            cooldown: DEFAULT_COOLDOWN,
            min_fingerprint_len: DEFAULT_MIN_FINGERPRINT_LEN,
            amount_keyword: DEFAULT_AMOUNT_KEYWORD.to_string(),
            require_positive_amount: true,
        }
    }
}

/// Result of the locked gate section for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Ineligible,
    DedupRejected,
    AmountRejected,
    CooldownRejected,
    Admitted(AlertEvent),
}

/// Terminal state of one detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Ineligible,
    DedupRejected,
    AmountRejected,
    CooldownRejected,
    Delivered(AlertEvent),
    DeliveryFailed { event: AlertEvent, error: String },
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub received: u64,
    pub ineligible: u64,
    pub dedup_rejected: u64,
    pub amount_rejected: u64,
    pub cooldown_rejected: u64,
    pub delivered: u64,
    pub failed: u64,
}

impl PipelineSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        self.received += 1;
        match outcome {
            Outcome::Ineligible => self.ineligible += 1,
            Outcome::DedupRejected => self.dedup_rejected += 1,
            Outcome::AmountRejected => self.amount_rejected += 1,
            Outcome::CooldownRejected => self.cooldown_rejected += 1,
            Outcome::Delivered(_) => self.delivered += 1,
            Outcome::DeliveryFailed { .. } => self.failed += 1,
        }
    }
}

struct GateState {
    dedup: Deduplicator,
    cooldown: AntiFlutter,
}

pub struct EventPipeline {
    cfg: PipelineConfig,
    extractor: AmountExtractor,
    state: Mutex<GateState>,
    notifier: Arc<dyn Notifier>,
}

impl EventPipeline {
    pub fn new(cfg: PipelineConfig, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        crate::metrics::ensure_metrics_described();
        let extractor = AmountExtractor::new(&cfg.amount_keyword)?;
        let state = GateState {
            dedup: Deduplicator::new(cfg.duplicate_window),
            cooldown: AntiFlutter::new(cfg.cooldown),
        };
        Ok(Self {
            cfg,
            extractor,
            state: Mutex::new(state),
            notifier,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn extract(&self, raw: &RawDetection) -> CandidateEvent {
        CandidateEvent {
            text: raw.text.clone(),
            url: raw.url.clone(),
            amount: self.extractor.extract(&raw.text),
            observed_at: raw.observed_at,
        }
    }

    /// The locked section: extract, fingerprint, dedup, amount policy, cooldown.
    pub fn admit(&self, raw: &RawDetection, now: DateTime<Utc>) -> Verdict {
        let candidate = self.extract(raw);
        let fp = fingerprint_detection(&candidate.text, &candidate.url);
        if !is_admissible(&fp, self.cfg.min_fingerprint_len) {
            counter!("pipeline_ineligible_total").increment(1);
            debug!(target: "pipeline", path = raw.path.as_str(), "fingerprint too short; ignored");
            return Verdict::Ineligible;
        }
        let id = short_id(&fp);

        let mut state = self.state.lock();
        if state.dedup.is_duplicate(&fp, now) {
            counter!("pipeline_dedup_rejected_total").increment(1);
            debug!(target: "pipeline", %id, path = raw.path.as_str(), "duplicate within window");
            return Verdict::DedupRejected;
        }
        state.dedup.remember(&fp, now);

        if self.cfg.require_positive_amount && !candidate.amount.is_some_and(|a| a > 0.0) {
            counter!("pipeline_amount_rejected_total").increment(1);
            debug!(target: "pipeline", %id, amount = ?candidate.amount, "no usable amount");
            return Verdict::AmountRejected;
        }

        if !state.cooldown.try_admit(now) {
            counter!("pipeline_cooldown_rejected_total").increment(1);
            info!(
                target: "pipeline",
                %id,
                amount = ?candidate.amount,
                remaining_min = state.cooldown.remaining_minutes(now),
                "event detected, but in cooldown"
            );
            return Verdict::CooldownRejected;
        }
        gauge!("pipeline_last_notified_ts").set(now.timestamp() as f64);
        info!(target: "pipeline", %id, amount = ?candidate.amount, path = raw.path.as_str(), "event admitted");

        Verdict::Admitted(AlertEvent {
            amount: candidate.amount,
            url: candidate.url,
            text: candidate.text,
            observed_at: candidate.observed_at,
        })
    }

    /// Run one detection through the pipeline at `now` and deliver it if admitted.
    pub async fn process_at(&self, raw: RawDetection, now: DateTime<Utc>) -> Outcome {
        let event = match self.admit(&raw, now) {
            Verdict::Ineligible => return Outcome::Ineligible,
            Verdict::DedupRejected => return Outcome::DedupRejected,
            Verdict::AmountRejected => return Outcome::AmountRejected,
            Verdict::CooldownRejected => return Outcome::CooldownRejected,
            Verdict::Admitted(ev) => ev,
        };

        match self.notifier.send(&event).await {
            Ok(()) => {
                counter!("notifications_sent_total").increment(1);
                info!(
                    target: "notify",
                    channel = self.notifier.name(),
                    amount = ?event.amount,
                    "alert sent"
                );
                Outcome::Delivered(event)
            }
            Err(e) => {
                // Cooldown stays committed; nothing is retried.
                let msg = format!("{e:#}");
                counter!("notifications_failed_total").increment(1);
                error!(
                    target: "notify",
                    channel = self.notifier.name(),
                    error = %msg,
                    "alert delivery failed"
                );
                Outcome::DeliveryFailed { event, error: msg }
            }
        }
    }

    pub async fn process(&self, raw: RawDetection) -> Outcome {
        self.process_at(raw, Utc::now()).await
    }

    /// Drop expired dedup entries. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        self.state.lock().dedup.purge_expired(now)
    }

    pub fn remembered(&self) -> usize {
        self.state.lock().dedup.len()
    }

    pub fn last_notified_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().cooldown.last_alert_at()
    }

    /// Consume detections until every producer is gone. Expired dedup entries
    /// are swept once per duplicate window in between.
    pub async fn run(&self, mut rx: mpsc::Receiver<RawDetection>) -> PipelineSummary {
        let every = self.cfg.duplicate_window.max(Duration::from_secs(1));
        let mut sweep = interval_at(Instant::now() + every, every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut summary = PipelineSummary::default();

        loop {
            tokio::select! {
                next = rx.recv() => {
                    let Some(raw) = next else { break };
                    let outcome = self.process(raw).await;
                    summary.record(&outcome);
                }
                _ = sweep.tick() => {
                    let removed = self.purge_expired(Utc::now());
                    if removed > 0 {
                        debug!(target: "pipeline", removed, "expired fingerprints swept");
                    }
                }
            }
        }

        info!(
            target: "pipeline",
            received = summary.received,
            delivered = summary.delivered,
            failed = summary.failed,
            "pipeline drained"
        );
        summary
    }
}

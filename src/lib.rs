// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod amount;
pub mod config;
pub mod dedup;
pub mod event;
pub mod fingerprint;
pub mod metrics;
pub mod observer;
pub mod pipeline;

// Alert delivery and the cooldown gate
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::amount::extract_amount;
pub use crate::config::WatchConfig;
pub use crate::event::{CandidateEvent, DetectionPath, RawDetection};
pub use crate::fingerprint::fingerprint;
pub use crate::notify::{AlertEvent, LogNotifier, Notifier};
pub use crate::observer::{ContentObserver, ObserverConfig, ObserverError, ObserverHandle};
pub use crate::pipeline::{EventPipeline, Outcome, PipelineConfig, PipelineSummary};

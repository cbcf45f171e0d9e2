// src/event.rs
//! Values that flow from the observer through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which observer path produced a detection. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionPath {
    Push,
    Poll,
}

impl DetectionPath {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionPath::Push => "push",
            DetectionPath::Poll => "poll",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub text: String,
    pub url: String,
    pub observed_at: DateTime<Utc>,
    pub path: DetectionPath,
}

impl RawDetection {
    pub fn new(text: impl Into<String>, url: impl Into<String>, path: DetectionPath) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
            observed_at: Utc::now(),
            path,
        }
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }
}

/// A detection after amount extraction. `amount` is `None` when nothing parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub text: String,
    pub url: String,
    pub amount: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

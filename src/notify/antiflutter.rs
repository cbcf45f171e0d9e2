// src/notify/antiflutter.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Default spacing between two delivered alerts.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(25 * 60);

/// Cooldown gate to prevent notification spam.
/// - First alert always allowed.
/// - Inside cooldown, alerts are suppressed.
/// - `try_admit` checks and commits in one step; the commit stands even if
///   delivery later fails.
#[derive(Debug, Clone)]
pub struct AntiFlutter {
    cooldown: ChronoDuration,
    last_alert_at: Option<DateTime<Utc>>,
}

impl Default for AntiFlutter {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl AntiFlutter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown: ChronoDuration::from_std(cooldown).unwrap_or(ChronoDuration::MAX),
            last_alert_at: None,
        }
    }

    /// Check if we may alert at `now`. Does NOT mutate state.
    pub fn should_alert(&self, now: DateTime<Utc>) -> bool {
        match self.last_alert_at {
            None => true,
            Some(ts) => now.signed_duration_since(ts) >= self.cooldown,
        }
    }

    /// Admit and record `now` as the last alert, or refuse without touching state.
    pub fn try_admit(&mut self, now: DateTime<Utc>) -> bool {
        if !self.should_alert(now) {
            return false;
        }
        self.last_alert_at = Some(now);
        true
    }

    pub fn last_alert_at(&self) -> Option<DateTime<Utc>> {
        self.last_alert_at
    }

    pub fn cooldown(&self) -> ChronoDuration {
        self.cooldown
    }

    /// Minutes until the gate reopens, rounded up; 0 when open.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        match self.last_alert_at {
            None => 0,
            Some(ts) => {
                let left = self.cooldown - now.signed_duration_since(ts);
                if left <= ChronoDuration::zero() {
                    0
                } else {
                    (left.num_seconds() + 59) / 60
                }
            }
        }
    }
}

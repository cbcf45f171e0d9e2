// src/dedup.rs
//! Time-windowed fingerprint memory.
//!
//! Entries expire lazily: every read compares the stored timestamp with `now`,
//! and [`Deduplicator::purge_expired`] sweeps the rest. Re-remembering a key
//! overwrites its timestamp, so expiry is always judged against the latest
//! insertion. No size-based eviction.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Default suppression window after a fingerprint is first seen.
pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Clone)]
pub struct Deduplicator {
    window: ChronoDuration,
    seen: HashMap<String, DateTime<Utc>>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DUPLICATE_WINDOW)
    }
}

impl Deduplicator {
    pub fn new(window: Duration) -> Self {
        let window = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::MAX);
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    pub fn window(&self) -> ChronoDuration {
        self.window
    }

    /// True iff `fp` was remembered less than one window before `now`.
    /// An expired entry met here is dropped.
    pub fn is_duplicate(&mut self, fp: &str, now: DateTime<Utc>) -> bool {
        match self.seen.get(fp) {
            None => false,
            Some(&at) if self.live(at, now) => true,
            Some(_) => {
                self.seen.remove(fp);
                false
            }
        }
    }

    /// Record `fp` as seen at `now`, superseding any earlier timestamp.
    pub fn remember(&mut self, fp: &str, now: DateTime<Utc>) {
        self.seen.insert(fp.to_owned(), now);
    }

    /// Drop every entry whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.seen.len();
        let window = self.window;
        self.seen
            .retain(|_, at| now.signed_duration_since(*at) < window);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn live(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(at) < self.window
    }
}

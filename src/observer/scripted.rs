// src/observer/scripted.rs
//! In-memory content session driven by the caller. Used by tests and the demo binary.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use super::session::{ContentSession, SessionError};

pub struct ScriptedSession {
    url: String,
    body: Mutex<String>,
    elements: Mutex<Vec<String>>,
    inserts: Mutex<Option<mpsc::Sender<String>>>,
    connected: Arc<watch::Sender<bool>>,
    refuse_hook: AtomicBool,
    failing_scans: AtomicU32,
    scan_delay: Mutex<Option<Duration>>,
    body_queries: AtomicU64,
    closed: AtomicBool,
}

impl ScriptedSession {
    pub fn new(url: impl Into<String>) -> Self {
        let (connected, _) = watch::channel(true);
        Self {
            url: url.into(),
            body: Mutex::new(String::new()),
            elements: Mutex::new(Vec::new()),
            inserts: Mutex::new(None),
            connected: Arc::new(connected),
            refuse_hook: AtomicBool::new(false),
            failing_scans: AtomicU32::new(0),
            scan_delay: Mutex::new(None),
            body_queries: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn set_body(&self, text: impl Into<String>) {
        *self.body.lock() = text.into();
    }

    pub fn set_elements<I, S>(&self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.elements.lock() = items.into_iter().map(Into::into).collect();
    }

    /// Deliver an insertion to the subscriber. `false` when nobody listens.
    pub async fn insert(&self, fragment: impl Into<String>) -> bool {
        let tx = self.inserts.lock().clone();
        match tx {
            Some(tx) => tx.send(fragment.into()).await.is_ok(),
            None => false,
        }
    }

    /// Make the next `n` body queries fail.
    pub fn fail_next_scans(&self, n: u32) {
        self.failing_scans.store(n, Ordering::SeqCst);
    }

    /// Every body query takes `delay` before answering.
    pub fn delay_scans(&self, delay: Duration) {
        *self.scan_delay.lock() = Some(delay);
    }

    /// Make `subscribe_insertions` fail, as if the hook could not be attached.
    pub fn refuse_hook(&self) {
        self.refuse_hook.store(true, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.connected.send_replace(false);
    }

    pub fn body_queries(&self) -> u64 {
        self.body_queries.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failing_scans
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl ContentSession for ScriptedSession {
    async fn subscribe_insertions(&self) -> Result<mpsc::Receiver<String>, SessionError> {
        if self.refuse_hook.load(Ordering::SeqCst) {
            return Err(SessionError::HookUnavailable("scripted refusal".into()));
        }
        let (tx, rx) = mpsc::channel(32);
        *self.inserts.lock() = Some(tx);
        Ok(rx)
    }

    async fn body_text(&self) -> Result<String, SessionError> {
        self.body_queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.scan_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !*self.connected.borrow() {
            return Err(SessionError::Disconnected);
        }
        if self.take_failure() {
            return Err(SessionError::Query("scripted scan failure".into()));
        }
        Ok(self.body.lock().clone())
    }

    async fn interactive_texts(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.elements.lock().clone())
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }

    fn connection(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.inserts.lock().take();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// src/observer/mod.rs
//! Dual-path content observer.
//!
//! Push path: every inserted fragment the session reports is matched on its own.
//! Poll path: on a fixed interval the whole body is scanned, then interactive
//! elements as a fallback. The push path deliberately has no element fallback;
//! an insertion is expected to be the banner itself.
//!
//! Both paths feed one channel and never correlate with each other; the
//! pipeline's dedup is what collapses them. Losing the session connection stops
//! both paths and raises [`ObserverError::SessionLost`] once.

pub mod http;
pub mod matcher;
pub mod scripted;
pub mod session;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::event::{DetectionPath, RawDetection};
use matcher::PhraseMatcher;
use session::{ContentSession, SessionError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ObserverConfig {
    pub poll_interval: Duration,
    /// Upper bound for one full scan; a timeout counts as a transient scan failure.
    pub scan_timeout: Duration,
    /// Run one full scan right after start, before the first interval tick.
    pub scan_on_start: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            scan_on_start: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObserverError {
    #[error("content session disconnected")]
    SessionLost,
}

pub struct ContentObserver {
    session: Arc<dyn ContentSession>,
    cfg: ObserverConfig,
    matcher: PhraseMatcher,
}

impl ContentObserver {
    pub fn new(session: Arc<dyn ContentSession>, cfg: ObserverConfig, matcher: PhraseMatcher) -> Self {
        Self {
            session,
            cfg,
            matcher,
        }
    }

    /// Attach the insertion hook, start polling and liveness watching.
    /// Detections are sent to `sink`. Setup failures only degrade the observer.
    pub async fn start(self, sink: mpsc::Sender<RawDetection>) -> ObserverHandle {
        crate::metrics::ensure_metrics_described();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown_tx);
        let (fatal_tx, fatal_rx) = oneshot::channel();
        let scans = Arc::new(AtomicU64::new(0));
        let mut tasks = Vec::with_capacity(3);

        match self.session.subscribe_insertions().await {
            Ok(rx) => tasks.push(tokio::spawn(push_loop(
                self.session.clone(),
                self.matcher.clone(),
                rx,
                shutdown_rx.clone(),
                sink.clone(),
            ))),
            Err(e) => warn!(
                target: "observer",
                error = %e,
                "insertion hook unavailable; continuing on poll path only"
            ),
        }

        tasks.push(tokio::spawn(poll_loop(
            self.session.clone(),
            self.matcher.clone(),
            self.cfg.clone(),
            shutdown_rx.clone(),
            sink,
            scans.clone(),
        )));

        tasks.push(tokio::spawn(liveness_loop(
            self.session.connection(),
            shutdown.clone(),
            shutdown_rx,
            fatal_tx,
        )));

        info!(
            target: "observer",
            url = %self.session.current_url(),
            every_ms = self.cfg.poll_interval.as_millis() as u64,
            phrase = %self.matcher.phrase(),
            "content observer started"
        );

        ObserverHandle {
            session: self.session,
            shutdown,
            fatal: Some(fatal_rx),
            tasks,
            scans,
        }
    }
}

pub struct ObserverHandle {
    session: Arc<dyn ContentSession>,
    shutdown: Arc<watch::Sender<bool>>,
    fatal: Option<oneshot::Receiver<ObserverError>>,
    tasks: Vec<JoinHandle<()>>,
    scans: Arc<AtomicU64>,
}

impl ObserverHandle {
    /// Resolves with the terminal error when the session is lost, or `None`
    /// once the observer stopped without one. Resolves at most once with `Some`.
    pub async fn fatal(&mut self) -> Option<ObserverError> {
        let rx = self.fatal.as_mut()?;
        let out = rx.await.ok();
        self.fatal = None;
        out
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Full scans started so far (initial scan included).
    pub fn scans_started(&self) -> u64 {
        self.scans.load(Ordering::SeqCst)
    }

    /// Cancel the poll timer, detach the hook and close the session.
    /// A scan already in flight finishes, but its result is dropped.
    pub async fn stop(self) {
        self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(target: "observer", error = %e, "observer task ended abnormally");
            }
        }
        if let Err(e) = self.session.close().await {
            warn!(target: "observer", error = %e, "session close failed");
        }
        info!(target: "observer", "content observer stopped");
    }
}

/// Hand a detection to the sink unless the observer stops first.
/// `false` means the path should end.
async fn emit(
    sink: &mpsc::Sender<RawDetection>,
    shutdown: &mut watch::Receiver<bool>,
    det: RawDetection,
) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    let path = det.path.as_str();
    tokio::select! {
        biased;
        _ = shutdown.changed() => false,
        sent = sink.send(det) => {
            if sent.is_ok() {
                counter!("detections_total", "path" => path).increment(1);
            }
            sent.is_ok()
        }
    }
}

async fn push_loop(
    session: Arc<dyn ContentSession>,
    matcher: PhraseMatcher,
    mut inserts: mpsc::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
    sink: mpsc::Sender<RawDetection>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let fragment = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            frag = inserts.recv() => frag,
        };
        let Some(fragment) = fragment else {
            debug!(target: "observer", "insertion hook closed");
            break;
        };
        if *shutdown.borrow() {
            break;
        }
        if !matcher.matches(&fragment) {
            continue;
        }
        let text = fragment.trim().to_string();
        info!(target: "observer", path = "push", "target phrase inserted");
        let det = RawDetection::new(text, session.current_url(), DetectionPath::Push);
        if !emit(&sink, &mut shutdown, det).await {
            debug!(target: "observer", "push path ending");
            break;
        }
    }
}

/// One full scan: body first, interactive elements as fallback.
async fn scan_once(
    session: &dyn ContentSession,
    matcher: &PhraseMatcher,
) -> Result<Option<String>, SessionError> {
    let body = session.body_text().await?;
    if let Some(found) = matcher.scan_body(&body) {
        return Ok(Some(found));
    }
    let elements = session.interactive_texts().await?;
    Ok(matcher.scan_elements(&elements))
}

async fn poll_loop(
    session: Arc<dyn ContentSession>,
    matcher: PhraseMatcher,
    cfg: ObserverConfig,
    mut shutdown: watch::Receiver<bool>,
    sink: mpsc::Sender<RawDetection>,
    scans: Arc<AtomicU64>,
) {
    let every = cfg.poll_interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut first = cfg.scan_on_start;

    loop {
        if !first {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
        }
        let initial = std::mem::take(&mut first);
        if *shutdown.borrow() {
            break;
        }

        scans.fetch_add(1, Ordering::SeqCst);
        counter!("observer_scans_total").increment(1);
        let result = timeout(cfg.scan_timeout, scan_once(session.as_ref(), &matcher)).await;

        // The observer may have stopped while the scan was running.
        if *shutdown.borrow() {
            debug!(target: "observer", "discarding scan result after stop");
            break;
        }

        match result {
            Ok(Ok(Some(text))) => {
                info!(target: "observer", path = "poll", initial, "target phrase found by scan");
                let det = RawDetection::new(text, session.current_url(), DetectionPath::Poll);
                if !emit(&sink, &mut shutdown, det).await {
                    debug!(target: "observer", "poll path ending");
                    break;
                }
            }
            Ok(Ok(None)) => trace!(target: "observer", "scan: no match"),
            Ok(Err(e)) => {
                counter!("observer_scan_errors_total").increment(1);
                if initial {
                    warn!(target: "observer", error = %e, "initial scan failed; polling continues");
                } else {
                    warn!(target: "observer", error = %e, "scan failed; retrying next tick");
                }
            }
            Err(_) => {
                counter!("observer_scan_errors_total").increment(1);
                warn!(
                    target: "observer",
                    timeout_ms = cfg.scan_timeout.as_millis() as u64,
                    "scan timed out; retrying next tick"
                );
            }
        }
    }
}

async fn liveness_loop(
    mut connection: watch::Receiver<bool>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown: watch::Receiver<bool>,
    fatal: oneshot::Sender<ObserverError>,
) {
    loop {
        if !*connection.borrow_and_update() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            changed = connection.changed() => {
                // A session that dropped its liveness signal is gone as well.
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    if *shutdown.borrow() {
        return;
    }
    error!(target: "observer", "content session disconnected; stopping observer");
    shutdown_tx.send_replace(true);
    let _ = fatal.send(ObserverError::SessionLost);
}

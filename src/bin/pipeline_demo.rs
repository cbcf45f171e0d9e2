//! Demo that drives a scripted page through the observer and pipeline (log notifier only).

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rain_watch::observer::scripted::ScriptedSession;
use rain_watch::{
    ContentObserver, DetectionPath, EventPipeline, LogNotifier, ObserverConfig, PipelineConfig,
    RawDetection, WatchConfig,
};
use tokio::sync::mpsc;

const BANNER: &str = "Join now to get free scrap based on your play amount · share 25,00";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let cfg = WatchConfig::default();

    // 1) Replay the timeline against the gates with synthetic timestamps.
    let pipeline = EventPipeline::new(PipelineConfig::default(), Arc::new(LogNotifier))?;
    let t0 = Utc::now();
    let timeline = [
        (0, DetectionPath::Push, BANNER),
        (5, DetectionPath::Poll, BANNER),
        (600, DetectionPath::Push, "Join now to get free scrap based on your play amount · share 3.10"),
        (1560, DetectionPath::Poll, "Join now to get free scrap based on your play amount · share 8.00"),
    ];
    for (secs, path, text) in timeline {
        let at = t0 + ChronoDuration::seconds(secs);
        let raw = RawDetection::new(text, &cfg.base_url, path).observed_at(at);
        let outcome = pipeline.process_at(raw, at).await;
        println!("t+{secs:>5}s {:<4} -> {outcome:?}", path.as_str());
    }

    // 2) Live run: both observer paths against a scripted page, then a disconnect.
    let session = Arc::new(ScriptedSession::new(cfg.base_url.clone()));
    let live = Arc::new(EventPipeline::new(PipelineConfig::default(), Arc::new(LogNotifier))?);
    let (tx, rx) = mpsc::channel(16);
    let consumer = {
        let live = live.clone();
        tokio::spawn(async move { live.run(rx).await })
    };

    let observer_cfg = ObserverConfig {
        poll_interval: Duration::from_millis(300),
        ..ObserverConfig::default()
    };
    let mut observer = ContentObserver::new(session.clone(), observer_cfg, cfg.matcher())
        .start(tx)
        .await;

    session.insert(BANNER).await;
    session.set_body(format!("Welcome back!\n{BANNER}"));
    tokio::time::sleep(Duration::from_millis(700)).await;
    session.disconnect();

    if let Some(e) = observer.fatal().await {
        println!("observer stopped: {e}");
    }
    observer.stop().await;
    let summary = consumer.await?;
    println!("live summary: {summary:?}");
    Ok(())
}

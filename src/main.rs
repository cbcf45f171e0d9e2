//! rain-watch binary entrypoint.
//! Wires the page session, observer, pipeline and notifier. Exits non-zero when
//! the content session is lost so the supervisor restarts it with fresh state.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rain_watch::notify::discord::DiscordNotifier;
use rain_watch::observer::http::HttpPageSession;
use rain_watch::{ContentObserver, EventPipeline, LogNotifier, Notifier, WatchConfig};

/// Compact logs by default, JSON lines with LOG_FORMAT=json.
/// RUST_LOG overrides the filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("observer=info,pipeline=info,notify=info,rain_watch=info,warn")
    });
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn build_notifier(cfg: &WatchConfig) -> Arc<dyn Notifier> {
    match &cfg.discord_webhook_url {
        Some(url) => Arc::new(
            DiscordNotifier::new(url.clone())
                .with_site_name(cfg.site_name.clone())
                .with_unit(cfg.unit.clone())
                .with_cooldown_minutes(cfg.cooldown_minutes),
        ),
        None => {
            warn!("DISCORD_WEBHOOK_URL not set; alerts go to the log only");
            Arc::new(LogNotifier)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cfg = WatchConfig::load()?;

    if let Some(addr) = cfg.metrics_socket()? {
        rain_watch::metrics::install_prometheus(addr)?;
        info!(%addr, "metrics exporter listening");
    }

    let pipeline = Arc::new(EventPipeline::new(cfg.pipeline(), build_notifier(&cfg))?);
    let session = Arc::new(HttpPageSession::connect(cfg.http_session()).await?);

    let (tx, rx) = mpsc::channel(cfg.channel_capacity);
    let consumer = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run(rx).await })
    };

    let mut observer = ContentObserver::new(session, cfg.observer(), cfg.matcher())
        .start(tx)
        .await;

    let code = tokio::select! {
        fatal = observer.fatal() => match fatal {
            Some(e) => {
                error!(error = %e, "exiting for restart");
                ExitCode::FAILURE
            }
            None => ExitCode::SUCCESS,
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            ExitCode::SUCCESS
        }
    };

    observer.stop().await;
    match consumer.await {
        Ok(summary) => info!(
            received = summary.received,
            delivered = summary.delivered,
            failed = summary.failed,
            dedup_rejected = summary.dedup_rejected,
            cooldown_rejected = summary.cooldown_rejected,
            "rain-watch stopped"
        ),
        Err(e) => warn!(error = %e, "pipeline task ended abnormally"),
    }
    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            let msg = format!("{e:#}");
            error!(error = %msg, "rain-watch failed to start");
            ExitCode::FAILURE
        }
    }
}

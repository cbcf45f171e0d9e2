// src/metrics.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "detections_total",
            "Raw detections emitted by the observer, labelled by path."
        );
        describe_counter!("observer_scans_total", "Full scans started by the poll path.");
        describe_counter!(
            "observer_scan_errors_total",
            "Poll scans that failed or timed out."
        );
        describe_counter!(
            "pipeline_ineligible_total",
            "Candidates with an empty or too-short fingerprint."
        );
        describe_counter!(
            "pipeline_dedup_rejected_total",
            "Candidates dropped inside the duplicate window."
        );
        describe_counter!(
            "pipeline_amount_rejected_total",
            "Candidates dropped for a missing or non-positive amount."
        );
        describe_counter!(
            "pipeline_cooldown_rejected_total",
            "Candidates dropped by the notification cooldown."
        );
        describe_counter!("notifications_sent_total", "Alerts delivered.");
        describe_counter!("notifications_failed_total", "Alerts whose delivery failed.");
        describe_gauge!(
            "pipeline_last_notified_ts",
            "Unix ts of the last admitted alert."
        );
    });
}

/// Install the Prometheus recorder with its own HTTP listener on `addr`.
/// Must be called from inside a Tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("installing prometheus exporter on {addr}"))?;
    ensure_metrics_described();
    Ok(())
}

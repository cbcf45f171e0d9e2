// tests/pipeline_e2e.rs
mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use common::{banner, RecordingNotifier, SITE};
use rain_watch::{DetectionPath, EventPipeline, Outcome, PipelineConfig, RawDetection};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 6, 21, 0, 0).unwrap()
}

fn detection(text: &str, path: DetectionPath, at: DateTime<Utc>) -> RawDetection {
    RawDetection::new(text, SITE, path).observed_at(at)
}

#[tokio::test]
async fn push_then_poll_then_cooldown_then_reopen() {
    let notifier = RecordingNotifier::new();
    let pipeline = EventPipeline::new(PipelineConfig::default(), notifier.clone()).unwrap();

    // push path sees the banner first
    let first = banner("25.00");
    let out = pipeline
        .process_at(detection(&first, DetectionPath::Push, t0()), t0())
        .await;
    match &out {
        Outcome::Delivered(ev) => {
            assert_eq!(ev.amount, Some(25.0));
            assert_eq!(ev.url, SITE);
        }
        other => panic!("expected delivery, got {other:?}"),
    }
    assert_eq!(pipeline.last_notified_at(), Some(t0()));

    // poll path finds the same occurrence 5s later
    let t5 = t0() + ChronoDuration::seconds(5);
    let out = pipeline
        .process_at(detection(&first, DetectionPath::Poll, t5), t5)
        .await;
    assert_eq!(out, Outcome::DedupRejected);

    // a new occurrence at +10 min passes dedup but not the cooldown
    let t10m = t0() + ChronoDuration::minutes(10);
    let out = pipeline
        .process_at(detection(&banner("12.00"), DetectionPath::Push, t10m), t10m)
        .await;
    assert_eq!(out, Outcome::CooldownRejected);

    // a third occurrence at +26 min passes both gates
    let t26m = t0() + ChronoDuration::minutes(26);
    let out = pipeline
        .process_at(detection(&banner("40.00"), DetectionPath::Poll, t26m), t26m)
        .await;
    assert!(out.is_delivered(), "got {out:?}");

    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].amount, Some(25.0));
    assert_eq!(sent[1].amount, Some(40.0));
    assert_eq!(pipeline.last_notified_at(), Some(t26m));
}

#[tokio::test]
async fn case_and_spacing_variants_are_one_occurrence() {
    let notifier = RecordingNotifier::new();
    let pipeline = EventPipeline::new(PipelineConfig::default(), notifier.clone()).unwrap();

    let a = banner("5,50");
    let b = format!("  {}\n", a.to_uppercase().replace(' ', "\u{00A0} "));
    assert!(pipeline
        .process_at(detection(&a, DetectionPath::Push, t0()), t0())
        .await
        .is_delivered());
    assert_eq!(
        pipeline
            .process_at(detection(&b, DetectionPath::Poll, t0()), t0())
            .await,
        Outcome::DedupRejected
    );
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn same_text_after_window_hits_cooldown_not_dedup() {
    let pipeline =
        EventPipeline::new(PipelineConfig::default(), RecordingNotifier::new()).unwrap();
    let text = banner("9.99");
    assert!(pipeline
        .process_at(detection(&text, DetectionPath::Push, t0()), t0())
        .await
        .is_delivered());

    let t3m = t0() + ChronoDuration::minutes(3);
    assert_eq!(
        pipeline
            .process_at(detection(&text, DetectionPath::Poll, t3m), t3m)
            .await,
        Outcome::CooldownRejected
    );
}

#[tokio::test]
async fn failed_delivery_is_reported_and_still_consumes_cooldown() {
    let notifier = RecordingNotifier::failing();
    let pipeline = EventPipeline::new(PipelineConfig::default(), notifier.clone()).unwrap();

    let out = pipeline
        .process_at(detection(&banner("25.00"), DetectionPath::Push, t0()), t0())
        .await;
    match out {
        Outcome::DeliveryFailed { event, error } => {
            assert_eq!(event.amount, Some(25.0));
            assert!(error.contains("webhook unreachable"));
        }
        other => panic!("expected delivery failure, got {other:?}"),
    }
    assert_eq!(pipeline.last_notified_at(), Some(t0()));

    // no retry, and the window stays closed
    let t1m = t0() + ChronoDuration::minutes(1);
    assert_eq!(
        pipeline
            .process_at(detection(&banner("30.00"), DetectionPath::Push, t1m), t1m)
            .await,
        Outcome::CooldownRejected
    );
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn missing_amount_does_not_consume_cooldown() {
    let notifier = RecordingNotifier::new();
    let pipeline = EventPipeline::new(PipelineConfig::default(), notifier.clone()).unwrap();

    let no_amount = format!("{} — stay tuned", common::PHRASE);
    assert_eq!(
        pipeline
            .process_at(detection(&no_amount, DetectionPath::Poll, t0()), t0())
            .await,
        Outcome::AmountRejected
    );
    assert_eq!(pipeline.last_notified_at(), None);

    let t1 = t0() + ChronoDuration::seconds(20);
    assert!(pipeline
        .process_at(detection(&banner("1.00"), DetectionPath::Poll, t1), t1)
        .await
        .is_delivered());
}

#[tokio::test]
async fn amount_policy_can_be_disabled() {
    let notifier = RecordingNotifier::new();
    let cfg = PipelineConfig {
        require_positive_amount: false,
        ..PipelineConfig::default()
    };
    let pipeline = EventPipeline::new(cfg, notifier.clone()).unwrap();

    let out = pipeline
        .process_at(detection(common::PHRASE, DetectionPath::Push, t0()), t0())
        .await;
    assert!(out.is_delivered());
    assert_eq!(notifier.sent()[0].amount, None);
}

#[tokio::test]
async fn noise_below_min_length_is_rejected_even_when_new() {
    let notifier = RecordingNotifier::new();
    let cfg = PipelineConfig {
        require_positive_amount: false,
        ..PipelineConfig::default()
    };
    let pipeline = EventPipeline::new(cfg, notifier.clone()).unwrap();

    let out = pipeline
        .process_at(
            RawDetection::new(" ab ", "", DetectionPath::Push).observed_at(t0()),
            t0(),
        )
        .await;
    assert_eq!(out, Outcome::Ineligible);
    assert_eq!(pipeline.remembered(), 0);
    assert!(notifier.sent().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_admit_exactly_one() {
    let notifier = RecordingNotifier::new();
    let pipeline =
        Arc::new(EventPipeline::new(PipelineConfig::default(), notifier.clone()).unwrap());
    let text = banner("25.00");

    let mut tasks = Vec::new();
    for i in 0..16 {
        let pipeline = pipeline.clone();
        let path = if i % 2 == 0 {
            DetectionPath::Push
        } else {
            DetectionPath::Poll
        };
        let raw = RawDetection::new(text.clone(), SITE, path);
        tasks.push(tokio::spawn(async move { pipeline.process(raw).await }));
    }

    let mut delivered = 0;
    for t in tasks {
        match t.await.unwrap() {
            Outcome::Delivered(_) => delivered += 1,
            Outcome::DedupRejected => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(delivered, 1);
    assert_eq!(notifier.sent().len(), 1);
}

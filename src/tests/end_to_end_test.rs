//! End-to-end scenarios spanning more than one service — ingest, baseline
//! creation, and acknowledging a detected regression — which need a live
//! pool. Single-service scenarios are covered as unit tests alongside the
//! code they exercise (see `regression_detector::mod`, `historic_store`).

use std::collections::HashMap;

use chrono::Utc;

use crate::models::{LatencySummary, PerClientMetrics, Run};
use crate::tests::common::create_test_services;

fn run(id: &str, avg_latency_ms: f64) -> Run {
    let mut client_metrics = HashMap::new();
    client_metrics.insert(
        "geth".to_string(),
        PerClientMetrics {
            client_name: "geth".into(),
            total_requests: 1000,
            total_errors: 10,
            error_rate: 0.01,
            latency: LatencySummary { avg_ms: avg_latency_ms, p95_ms: Some(avg_latency_ms * 2.0), p99_ms: Some(avg_latency_ms * 3.3), ..Default::default() },
            ..Default::default()
        },
    );
    Run {
        id: id.into(),
        test_name: "T".into(),
        timestamp: Utc::now(),
        start_time: Utc::now(),
        end_time: Utc::now(),
        duration_secs: 60.0,
        git_commit: None,
        git_branch: None,
        tags: vec![],
        target_rps: None,
        client_list: vec!["geth".into()],
        method_list: vec![],
        total_requests: 1000,
        total_errors: 10,
        overall_error_rate: 0.01,
        avg_latency_ms,
        min_latency_ms: Some(10.0),
        p50_latency_ms: Some(avg_latency_ms * 0.8),
        p95_latency_ms: Some(avg_latency_ms * 2.0),
        p99_latency_ms: Some(avg_latency_ms * 3.3),
        max_latency_ms: Some(avg_latency_ms * 4.0),
        client_metrics,
        environment: None,
        is_baseline: false,
        notes: None,
        artifact_path: None,
    }
}

/// A fresh ingest round-trips and the error rate lands at 1%.
#[tokio::test]
async fn fresh_ingest_round_trips() {
    let services = create_test_services().await;
    let ingested = services.historic_store.ingest_run(run("r1", 150.0)).await.unwrap();
    assert!((ingested.overall_error_rate - 0.01).abs() < 1e-9);

    let fetched = services.historic_store.get_run("r1").await.unwrap();
    assert_eq!(fetched.avg_latency_ms, 150.0);
    assert_eq!(fetched.total_requests, 1000);
}

/// A baseline created from a run reports that run's latency in its frozen
/// snapshot.
#[tokio::test]
async fn baseline_creation_snapshots_the_source_run() {
    let services = create_test_services().await;
    services.historic_store.ingest_run(run("r1", 150.0)).await.unwrap();

    let baseline = services.baseline_manager.set_baseline("r1", "b1", None, true).await.unwrap();
    assert_eq!(baseline.run_id, "r1");
    assert_eq!(baseline.snapshot.avg_latency_ms, 150.0);

    let fetched = services.baseline_manager.get_baseline("b1").await.unwrap();
    assert_eq!(fetched.snapshot.avg_latency_ms, 150.0);
}

/// Acknowledging a regression persists and survives a later detection
/// pass re-running over the same run.
#[tokio::test]
async fn acknowledge_persists_across_redetection() {
    let services = create_test_services().await;
    services.historic_store.ingest_run(run("r1", 150.0)).await.unwrap();
    services.baseline_manager.set_baseline("r1", "b1", None, true).await.unwrap();
    services.historic_store.ingest_run(run("r2", 225.0)).await.unwrap();

    let options = crate::models::DetectionOptions {
        mode: crate::models::ComparisonMode::Baseline,
        baseline_name: Some("b1".to_string()),
        lookback_count: 1,
        window_size: 5,
        enable_statistical: false,
        custom_thresholds: HashMap::new(),
        include_clients: vec![],
        exclude_clients: vec![],
        include_methods: vec![],
        exclude_methods: vec![],
        min_confidence: None,
        ignore_improvements: false,
    };

    let report = services.regression_detector.detect_regressions("r2", options.clone()).await.unwrap();
    let regression = report.regressions.iter().find(|r| r.metric_key == "avg_latency_ms" && r.client == "*").unwrap();

    let acknowledged = services.historic_store.acknowledge_regression(&regression.id, "alice", None).await.unwrap();
    assert!(acknowledged.acknowledged_at.is_some());
    assert_eq!(acknowledged.acknowledged_by.as_deref(), Some("alice"));

    // Re-detecting doesn't clear the acknowledgement: it's a property of
    // the persisted regression row, not the detection pass.
    let persisted = services.historic_store.list_regressions(Some("r2")).await.unwrap();
    let still_ack = persisted.iter().find(|r| r.id == regression.id).unwrap();
    assert!(still_ack.acknowledged_at.is_some());
}

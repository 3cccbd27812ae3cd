use serde::Serialize;
use utoipa::ToSchema;

use crate::models::run::Run;

/// Output of `POST /api/runs/{id}/analyze` — a lightweight, dependency-free
/// read of one run's own numbers, distinct from regression detection
/// (which always needs a comparison basis).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RunAnalysis {
    pub run_id: String,
    /// `100` minus penalties for high error rate and wide latency spread;
    /// clamped to `[0, 100]`.
    pub quality_score: i32,
    pub anomalies: Vec<String>,
}

/// Flags a run's own numbers for obviously bad shape, without reference to
/// any other run: high error rate, a fat tail relative to the median, and
/// per-client error-rate outliers relative to the run's overall rate.
pub fn analyze_run(run: &Run) -> RunAnalysis {
    let mut anomalies = Vec::new();
    let mut score = 100i32;

    if run.overall_error_rate > 0.05 {
        anomalies.push(format!("error rate {:.2}% exceeds 5%", run.overall_error_rate * 100.0));
        score -= 30;
    } else if run.overall_error_rate > 0.01 {
        anomalies.push(format!("error rate {:.2}% exceeds 1%", run.overall_error_rate * 100.0));
        score -= 10;
    }

    if let (Some(p50), Some(p99)) = (run.p50_latency_ms, run.p99_latency_ms) {
        if p50 > 0.0 && p99 / p50 > 5.0 {
            anomalies.push(format!("p99/p50 ratio {:.1} indicates a fat latency tail", p99 / p50));
            score -= 15;
        }
    }

    for (client, metrics) in &run.client_metrics {
        if metrics.error_rate > run.overall_error_rate * 3.0 && metrics.error_rate > 0.02 {
            anomalies.push(format!("client {client} error rate {:.2}% is an outlier vs run average", metrics.error_rate * 100.0));
            score -= 10;
        }
    }

    RunAnalysis { run_id: run.id.clone(), quality_score: score.clamp(0, 100), anomalies }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_run() -> Run {
        Run {
            id: "r1".into(),
            test_name: "t".into(),
            timestamp: chrono::Utc::now(),
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            duration_secs: 1.0,
            git_commit: None,
            git_branch: None,
            tags: vec![],
            target_rps: None,
            client_list: vec![],
            method_list: vec![],
            total_requests: 1000,
            total_errors: 5,
            overall_error_rate: 0.005,
            avg_latency_ms: 100.0,
            min_latency_ms: Some(10.0),
            p50_latency_ms: Some(90.0),
            p95_latency_ms: Some(200.0),
            p99_latency_ms: Some(250.0),
            max_latency_ms: Some(300.0),
            client_metrics: HashMap::new(),
            environment: None,
            is_baseline: false,
            notes: None,
            artifact_path: None,
        }
    }

    #[test]
    fn clean_run_scores_full_marks() {
        let analysis = analyze_run(&base_run());
        assert_eq!(analysis.quality_score, 100);
        assert!(analysis.anomalies.is_empty());
    }

    #[test]
    fn high_error_rate_is_flagged_and_penalized() {
        let mut run = base_run();
        run.overall_error_rate = 0.1;
        let analysis = analyze_run(&run);
        assert_eq!(analysis.quality_score, 70);
        assert_eq!(analysis.anomalies.len(), 1);
    }

    #[test]
    fn fat_tail_latency_is_flagged() {
        let mut run = base_run();
        run.p50_latency_ms = Some(50.0);
        run.p99_latency_ms = Some(500.0);
        let analysis = analyze_run(&run);
        assert!(analysis.anomalies.iter().any(|a| a.contains("fat latency tail")));
    }
}

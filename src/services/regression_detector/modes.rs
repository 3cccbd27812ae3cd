//! Comparison-basis resolution for the three detection modes.
//!
//! `AggregateBasis` is the synthesized "rolling average run": a distinct
//! internal type, never a `Run`, never persisted or ingestable, so it can't
//! be confused with real history.

use std::collections::{BTreeSet, HashMap};

use crate::models::{LatencySummary, MethodSummary, PerClientMetrics, Run};

/// Per-field arithmetic mean of a set of runs' metrics. Fields absent in
/// every contributing run stay absent rather than being fabricated.
#[derive(Debug, Clone)]
pub struct AggregateBasis {
    pub source_run_ids: Vec<String>,
    pub overall_error_rate: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub client_metrics: HashMap<String, PerClientMetrics>,
}

fn avg(values: impl Iterator<Item = f64>) -> Option<f64> {
    let vals: Vec<f64> = values.collect();
    if vals.is_empty() { None } else { Some(vals.iter().sum::<f64>() / vals.len() as f64) }
}

fn avg_opt(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    avg(values.flatten())
}

/// Builds an [`AggregateBasis`] from a set of runs.
/// Testable property 8: the result's per-metric values equal the
/// arithmetic mean of the same metric across `runs`, modulo absent fields.
pub fn aggregate_runs(runs: &[Run]) -> AggregateBasis {
    let mut client_names: BTreeSet<String> = BTreeSet::new();
    for run in runs {
        client_names.extend(run.client_metrics.keys().cloned());
    }

    let mut client_metrics = HashMap::new();
    for name in client_names {
        let per_run: Vec<&PerClientMetrics> = runs.iter().filter_map(|r| r.client_metrics.get(&name)).collect();
        if per_run.is_empty() {
            continue;
        }

        let mut method_names: BTreeSet<String> = BTreeSet::new();
        for c in &per_run {
            method_names.extend(c.methods.keys().cloned());
        }
        let mut methods = HashMap::new();
        for m in method_names {
            let per_method: Vec<&MethodSummary> = per_run.iter().filter_map(|c| c.methods.get(&m)).collect();
            if per_method.is_empty() {
                continue;
            }
            methods.insert(
                m,
                MethodSummary {
                    count: 0,
                    error_count: 0,
                    success_count: 0,
                    avg_ms: avg(per_method.iter().map(|s| s.avg_ms)).unwrap_or(0.0),
                    p50_ms: avg_opt(per_method.iter().map(|s| s.p50_ms)),
                    p90_ms: avg_opt(per_method.iter().map(|s| s.p90_ms)),
                    p95_ms: avg_opt(per_method.iter().map(|s| s.p95_ms)),
                    p99_ms: avg_opt(per_method.iter().map(|s| s.p99_ms)),
                    min_ms: avg_opt(per_method.iter().map(|s| s.min_ms)),
                    max_ms: avg_opt(per_method.iter().map(|s| s.max_ms)),
                    std_dev_ms: avg_opt(per_method.iter().map(|s| s.std_dev_ms)),
                    throughput_rps: avg_opt(per_method.iter().map(|s| s.throughput_rps)),
                    coefficient_of_variation: avg_opt(per_method.iter().map(|s| s.coefficient_of_variation)),
                },
            );
        }

        client_metrics.insert(
            name.clone(),
            PerClientMetrics {
                client_name: name,
                total_requests: 0,
                total_errors: 0,
                error_rate: avg(per_run.iter().map(|c| c.error_rate)).unwrap_or(0.0),
                latency: LatencySummary {
                    avg_ms: avg(per_run.iter().map(|c| c.latency.avg_ms)).unwrap_or(0.0),
                    min_ms: avg_opt(per_run.iter().map(|c| c.latency.min_ms)),
                    max_ms: avg_opt(per_run.iter().map(|c| c.latency.max_ms)),
                    p50_ms: avg_opt(per_run.iter().map(|c| c.latency.p50_ms)),
                    p90_ms: avg_opt(per_run.iter().map(|c| c.latency.p90_ms)),
                    p95_ms: avg_opt(per_run.iter().map(|c| c.latency.p95_ms)),
                    p99_ms: avg_opt(per_run.iter().map(|c| c.latency.p99_ms)),
                    std_dev_ms: avg_opt(per_run.iter().map(|c| c.latency.std_dev_ms)),
                    throughput_rps: avg_opt(per_run.iter().map(|c| c.latency.throughput_rps)),
                },
                connections: Default::default(),
                methods,
            },
        );
    }

    AggregateBasis {
        source_run_ids: runs.iter().map(|r| r.id.clone()).collect(),
        overall_error_rate: avg(runs.iter().map(|r| r.overall_error_rate)).unwrap_or(0.0),
        avg_latency_ms: avg(runs.iter().map(|r| r.avg_latency_ms)).unwrap_or(0.0),
        p50_latency_ms: avg_opt(runs.iter().map(|r| r.p50_latency_ms)),
        p95_latency_ms: avg_opt(runs.iter().map(|r| r.p95_latency_ms)),
        p99_latency_ms: avg_opt(runs.iter().map(|r| r.p99_latency_ms)),
        max_latency_ms: avg_opt(runs.iter().map(|r| r.max_latency_ms)),
        client_metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn run(avg_latency_ms: f64) -> Run {
        Run {
            id: uuid::Uuid::new_v4().to_string(),
            test_name: "T".to_string(),
            timestamp: Utc::now(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration_secs: 1.0,
            git_commit: None,
            git_branch: None,
            tags: vec![],
            target_rps: None,
            client_list: vec![],
            method_list: vec![],
            total_requests: 1000,
            total_errors: 0,
            overall_error_rate: 0.0,
            avg_latency_ms,
            min_latency_ms: None,
            p50_latency_ms: None,
            p95_latency_ms: None,
            p99_latency_ms: None,
            max_latency_ms: None,
            client_metrics: HashMap::new(),
            environment: None,
            is_baseline: false,
            notes: None,
            artifact_path: None,
        }
    }

    #[test]
    fn aggregate_is_arithmetic_mean() {
        let runs = vec![run(100.0), run(110.0), run(90.0), run(105.0), run(95.0)];
        let basis = aggregate_runs(&runs);
        assert!((basis.avg_latency_ms - 100.0).abs() < 1e-9);
    }

    #[test]
    fn absent_fields_stay_absent() {
        let runs = vec![run(100.0), run(110.0)];
        let basis = aggregate_runs(&runs);
        assert!(basis.p95_latency_ms.is_none());
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::utils::{ApiError, ApiResult};

/// A single completed benchmark execution against a set of clients.
///
/// Immutable after [`crate::services::HistoricStore::ingest_run`] except
/// for `notes`, `is_baseline`, and `tags`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Run {
    pub id: String,
    pub test_name: String,
    pub timestamp: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: f64,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub target_rps: Option<f64>,
    #[serde(default)]
    pub client_list: Vec<String>,
    #[serde(default)]
    pub method_list: Vec<String>,

    pub total_requests: i64,
    pub total_errors: i64,
    pub overall_error_rate: f64,

    pub avg_latency_ms: f64,
    pub min_latency_ms: Option<f64>,
    pub p50_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,

    #[serde(default)]
    pub client_metrics: HashMap<String, PerClientMetrics>,
    pub environment: Option<EnvironmentSnapshot>,

    pub is_baseline: bool,
    pub notes: Option<String>,

    /// Populated by the store after the artifact bundle is written; absent
    /// when the file write failed.
    pub artifact_path: Option<String>,
}

/// Metrics for one benchmarked client within a [`Run`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PerClientMetrics {
    pub client_name: String,
    pub total_requests: i64,
    pub total_errors: i64,
    pub error_rate: f64,
    pub latency: LatencySummary,
    #[serde(default)]
    pub connections: ConnectionMetrics,
    #[serde(default)]
    pub methods: HashMap<String, MethodSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LatencySummary {
    pub avg_ms: f64,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p90_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub std_dev_ms: Option<f64>,
    pub throughput_rps: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ConnectionMetrics {
    pub active: Option<i64>,
    pub total_opened: Option<i64>,
    pub errors: Option<i64>,
}

/// Per-method statistics within a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MethodSummary {
    pub count: i64,
    pub error_count: i64,
    pub success_count: i64,
    pub avg_ms: f64,
    pub min_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p90_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub std_dev_ms: Option<f64>,
    pub throughput_rps: Option<f64>,
    pub coefficient_of_variation: Option<f64>,
}

/// Snapshot of the execution environment the load driver ran against.
/// Opaque beyond a handful of well-known fields — kept intentionally
/// loose since the driver is an external collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EnvironmentSnapshot {
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub cpu_cores: Option<u32>,
    pub memory_bytes: Option<u64>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Filter for [`crate::services::HistoricStore::list_runs`].
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RunFilter {
    pub test_name: Option<String>,
    pub git_branch: Option<String>,
    pub client: Option<String>,
    pub method: Option<String>,
    pub is_baseline: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Summary of all runs for a test name.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RunSummary {
    pub test_name: String,
    pub total_runs: i64,
    pub first_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub best_run_id: Option<String>,
    pub worst_run_id: Option<String>,
}

/// One row of the per-method matrix returned by `GET /api/runs/{id}/methods`
/// — a flattened `(client, method) -> MethodSummary` view.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MethodMatrixRow {
    pub client: String,
    pub method: String,
    pub summary: MethodSummary,
}

impl Run {
    /// Flattens `client_metrics[*].methods` into a stable client/method
    /// ordered matrix for tabular display.
    pub fn methods_matrix(&self) -> Vec<MethodMatrixRow> {
        let mut rows: Vec<MethodMatrixRow> = self
            .client_metrics
            .iter()
            .flat_map(|(client, metrics)| {
                metrics
                    .methods
                    .iter()
                    .map(|(method, summary)| MethodMatrixRow { client: client.clone(), method: method.clone(), summary: summary.clone() })
            })
            .collect();
        rows.sort_by(|a, b| a.client.cmp(&b.client).then_with(|| a.method.cmp(&b.method)));
        rows
    }

    /// Validates. Called on ingest; a violation is
    /// `ApiError::InvalidInput`, not silently coerced.
    pub fn validate(&self) -> ApiResult<()> {
        if self.id.trim().is_empty() {
            return Err(ApiError::invalid_input("run id must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.overall_error_rate) {
            return Err(ApiError::invalid_input(format!(
                "overall_error_rate must be within [0, 1], got {}",
                self.overall_error_rate
            )));
        }
        if self.total_errors > self.total_requests {
            return Err(ApiError::invalid_input(
                "total_errors must not exceed total_requests",
            ));
        }
        if self.start_time > self.end_time {
            return Err(ApiError::invalid_input("start_time must not be after end_time"));
        }
        check_percentile_order(
            self.min_latency_ms,
            self.p50_latency_ms,
            self.p95_latency_ms,
            self.p99_latency_ms,
            self.max_latency_ms,
        )?;
        for (name, client) in &self.client_metrics {
            client.validate(name)?;
        }
        Ok(())
    }
}

impl PerClientMetrics {
    fn validate(&self, client_name: &str) -> ApiResult<()> {
        check_percentile_order(
            self.latency.min_ms,
            self.latency.p50_ms,
            self.latency.p95_ms,
            self.latency.p99_ms,
            self.latency.max_ms,
        )
        .map_err(|e| ApiError::invalid_input(format!("client {client_name}: {e}")))?;

        for (method, summary) in &self.methods {
            if summary.error_count + summary.success_count != summary.count {
                return Err(ApiError::invalid_input(format!(
                    "client {client_name} method {method}: error_count + success_count must equal count"
                )));
            }
            check_percentile_order(
                summary.min_ms,
                summary.p50_ms,
                summary.p95_ms,
                summary.p99_ms,
                summary.max_ms,
            )
            .map_err(|e| {
                ApiError::invalid_input(format!("client {client_name} method {method}: {e}"))
            })?;
        }
        Ok(())
    }
}

/// `min ≤ p50 ≤ p95/p90 ≤ p99 ≤ max` whenever all given fields are present.
/// Missing fields are skipped, never fabricated.
fn check_percentile_order(
    min: Option<f64>,
    p50: Option<f64>,
    p95: Option<f64>,
    p99: Option<f64>,
    max: Option<f64>,
) -> ApiResult<()> {
    let ordered: Vec<(&str, f64)> = [("min", min), ("p50", p50), ("p95", p95), ("p99", p99), ("max", max)]
        .into_iter()
        .filter_map(|(name, v)| v.map(|v| (name, v)))
        .collect();

    for pair in ordered.windows(2) {
        let (lo_name, lo) = pair[0];
        let (hi_name, hi) = pair[1];
        if lo > hi {
            return Err(ApiError::invalid_input(format!(
                "percentile ordering violated: {lo_name} ({lo}) > {hi_name} ({hi})"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_run() -> Run {
        Run {
            id: "r1".into(),
            test_name: "t".into(),
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
            total_errors: 10,
            overall_error_rate: 0.01,
            avg_latency_ms: 150.0,
            min_latency_ms: Some(10.0),
            p50_latency_ms: Some(100.0),
            p95_latency_ms: Some(300.0),
            p99_latency_ms: Some(500.0),
            max_latency_ms: Some(600.0),
            client_metrics: HashMap::new(),
            environment: None,
            is_baseline: false,
            notes: None,
            artifact_path: None,
        }
    }

    #[test]
    fn valid_run_passes() {
        assert!(base_run().validate().is_ok());
    }

    #[test]
    fn error_rate_out_of_range_rejected() {
        let mut run = base_run();
        run.overall_error_rate = 1.5;
        assert!(run.validate().is_err());
    }

    #[test]
    fn errors_exceeding_requests_rejected() {
        let mut run = base_run();
        run.total_errors = 2000;
        assert!(run.validate().is_err());
    }

    #[test]
    fn percentile_disorder_rejected() {
        let mut run = base_run();
        run.p95_latency_ms = Some(1000.0);
        assert!(run.validate().is_err());
    }

    #[test]
    fn missing_percentiles_are_skipped_not_fabricated() {
        let mut run = base_run();
        run.p95_latency_ms = None;
        assert!(run.validate().is_ok());
    }
}

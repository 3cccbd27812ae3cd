//! H2: named reference points plus baseline-vs-run comparison.
//!
//! Generalized from SQL-profile baselines to benchmark-run baselines. A
//! process-global in-memory cache was deliberately not carried over: state
//! lives in the `baselines` table, read through the pool.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::models::{Baseline, PerClientMetrics, Run, RunSnapshot};
use crate::services::historic_store::HistoricStore;
use crate::utils::{ApiError, ApiResult};

pub struct BaselineManager {
    pool: SqlitePool,
    store: Arc<HistoricStore>,
}

#[derive(FromRow)]
struct BaselineRow {
    id: i64,
    name: String,
    test_name: String,
    run_id: String,
    description: Option<String>,
    captured_at: DateTime<Utc>,
    active: bool,
    snapshot_json: String,
}

impl BaselineRow {
    fn into_baseline(self) -> ApiResult<Baseline> {
        Ok(Baseline {
            id: self.id,
            name: self.name,
            test_name: self.test_name,
            run_id: self.run_id,
            description: self.description,
            captured_at: self.captured_at,
            active: self.active,
            snapshot: serde_json::from_str(&self.snapshot_json)?,
        })
    }
}

/// Per-metric delta produced by [`BaselineManager::compare_to_baseline`].
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MetricDelta {
    pub client: String,
    pub method: Option<String>,
    pub metric_key: String,
    pub baseline_value: f64,
    pub current_value: f64,
    pub absolute_change: f64,
    pub percent_change: Option<f64>,
    pub classification: DeltaClassification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeltaClassification {
    Improvement,
    Regression,
    Neutral,
}

/// Generic metric-level diff result; `baseline_name` is repurposed as the
/// other run's id when produced by [`diff_runs`] rather than a named
/// baseline comparison.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Comparison {
    pub run_id: String,
    pub baseline_name: String,
    pub deltas: Vec<MetricDelta>,
    pub improvements: usize,
    pub regressions: usize,
    pub neutral: usize,
}

impl BaselineManager {
    pub fn new(pool: SqlitePool, store: Arc<HistoricStore>) -> Self {
        Self { pool, store }
    }

    /// Upsert-by-name: same name overwrites run-id/description/snapshot,
    /// id is preserved.
    pub async fn set_baseline(&self, run_id: &str, name: &str, description: Option<String>, activate: bool) -> ApiResult<Baseline> {
        let run = self.store.get_run(run_id).await?;
        let snapshot = RunSnapshot::from(&run);
        let snapshot_json = serde_json::to_string(&snapshot)?;
        let captured_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        if activate {
            sqlx::query("UPDATE baselines SET active = 0 WHERE test_name = ?").bind(&run.test_name).execute(&mut *tx).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO baselines (name, test_name, run_id, description, captured_at, active, snapshot_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                run_id = excluded.run_id,
                description = excluded.description,
                captured_at = excluded.captured_at,
                active = excluded.active,
                snapshot_json = excluded.snapshot_json
            "#,
        )
        .bind(name)
        .bind(&run.test_name)
        .bind(run_id)
        .bind(&description)
        .bind(captured_at)
        .bind(activate)
        .bind(&snapshot_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(baseline = %name, run_id, "baseline set");
        self.get_baseline(name).await
    }

    /// Baseline names are globally unique, so lookup needs only
    /// the name.
    pub async fn get_baseline(&self, name: &str) -> ApiResult<Baseline> {
        let row: BaselineRow = sqlx::query_as("SELECT * FROM baselines WHERE name = ?").bind(name).fetch_one(&self.pool).await?;
        row.into_baseline()
    }

    /// `None` for `test_name` lists baselines for every test.
    pub async fn list_baselines(&self, test_name: Option<&str>) -> ApiResult<Vec<Baseline>> {
        let rows: Vec<BaselineRow> = if let Some(test_name) = test_name {
            sqlx::query_as("SELECT * FROM baselines WHERE test_name = ? ORDER BY name")
                .bind(test_name)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT * FROM baselines ORDER BY test_name, name").fetch_all(&self.pool).await?
        };
        rows.into_iter().map(BaselineRow::into_baseline).collect()
    }

    pub async fn delete_baseline(&self, name: &str) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM baselines WHERE name = ?").bind(name).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("baseline {name}")));
        }
        Ok(())
    }

    /// Finds the currently-active baseline for a test, if any.
    pub async fn active_baseline(&self, test_name: &str) -> ApiResult<Option<Baseline>> {
        let row: Option<BaselineRow> = sqlx::query_as("SELECT * FROM baselines WHERE test_name = ? AND active = 1")
            .bind(test_name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(BaselineRow::into_baseline).transpose()
    }

    /// Per-client, per-method metric deltas classified improvement /
    /// regression / neutral by direction rules.
    pub async fn compare_to_baseline(&self, run_id: &str, baseline_name: &str) -> ApiResult<Comparison> {
        let run = self.store.get_run(run_id).await?;
        let baseline = self.get_baseline(baseline_name).await?;

        let mut deltas = Vec::new();
        deltas.extend(aggregate_deltas(&run, &baseline.snapshot));
        for (client_name, current) in &run.client_metrics {
            if let Some(base) = baseline.snapshot.client_metrics.get(client_name) {
                deltas.extend(client_deltas(client_name, current, base));
            }
        }

        let improvements = deltas.iter().filter(|d| d.classification == DeltaClassification::Improvement).count();
        let regressions = deltas.iter().filter(|d| d.classification == DeltaClassification::Regression).count();
        let neutral = deltas.len() - improvements - regressions;

        Ok(Comparison { run_id: run_id.to_string(), baseline_name: baseline_name.to_string(), deltas, improvements, regressions, neutral })
    }
}

/// Run-vs-run diff for `GET /api/runs/{id}/compare/{otherId}`: reuses the
/// baseline delta/classification rules with `other` standing in for the
/// snapshot side, so a diff against an arbitrary run and a diff against a
/// frozen baseline read identically.
pub fn diff_runs(current: &Run, other: &Run) -> Comparison {
    let snapshot = RunSnapshot::from(other);
    let mut deltas = aggregate_deltas(current, &snapshot);
    for (client_name, current_metrics) in &current.client_metrics {
        if let Some(base) = other.client_metrics.get(client_name) {
            deltas.extend(client_deltas(client_name, current_metrics, base));
        }
    }

    let improvements = deltas.iter().filter(|d| d.classification == DeltaClassification::Improvement).count();
    let regressions = deltas.iter().filter(|d| d.classification == DeltaClassification::Regression).count();
    let neutral = deltas.len() - improvements - regressions;

    Comparison { run_id: current.id.clone(), baseline_name: other.id.clone(), deltas, improvements, regressions, neutral }
}

fn classify(metric_key: &str, absolute_change: f64) -> DeltaClassification {
    let improves_on_decrease = metric_key.contains("latency") || metric_key.contains("error");
    let improves_on_increase = metric_key.contains("throughput") || metric_key.ends_with("rps");

    if absolute_change == 0.0 {
        return DeltaClassification::Neutral;
    }
    if improves_on_decrease {
        if absolute_change < 0.0 { DeltaClassification::Improvement } else { DeltaClassification::Regression }
    } else if improves_on_increase {
        if absolute_change > 0.0 { DeltaClassification::Improvement } else { DeltaClassification::Regression }
    } else {
        DeltaClassification::Neutral
    }
}

fn delta(client: &str, method: Option<String>, metric_key: &str, baseline_value: f64, current_value: f64) -> MetricDelta {
    let absolute_change = current_value - baseline_value;
    let percent_change = if baseline_value != 0.0 { Some(absolute_change / baseline_value * 100.0) } else { None };
    MetricDelta {
        client: client.to_string(),
        method,
        metric_key: metric_key.to_string(),
        baseline_value,
        current_value,
        absolute_change,
        percent_change,
        classification: classify(metric_key, absolute_change),
    }
}

fn aggregate_deltas(run: &Run, snapshot: &RunSnapshot) -> Vec<MetricDelta> {
    let mut out = vec![delta("*", None, "error_rate", snapshot.overall_error_rate, run.overall_error_rate)];
    out.push(delta("*", None, "avg_latency_ms", snapshot.avg_latency_ms, run.avg_latency_ms));
    if let (Some(b), Some(c)) = (snapshot.p95_latency_ms, run.p95_latency_ms) {
        out.push(delta("*", None, "p95_latency_ms", b, c));
    }
    if let (Some(b), Some(c)) = (snapshot.p99_latency_ms, run.p99_latency_ms) {
        out.push(delta("*", None, "p99_latency_ms", b, c));
    }
    out
}

fn client_deltas(client_name: &str, current: &PerClientMetrics, baseline: &PerClientMetrics) -> Vec<MetricDelta> {
    let mut out = vec![delta(client_name, None, "error_rate", baseline.error_rate, current.error_rate)];
    out.push(delta(client_name, None, "avg_latency_ms", baseline.latency.avg_ms, current.latency.avg_ms));
    if let (Some(b), Some(c)) = (baseline.latency.throughput_rps, current.latency.throughput_rps) {
        out.push(delta(client_name, None, "throughput_rps", b, c));
    }

    for (method_name, current_method) in &current.methods {
        if let Some(base_method) = baseline.methods.get(method_name) {
            out.push(delta(client_name, Some(method_name.clone()), "avg_latency_ms", base_method.avg_ms, current_method.avg_ms));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunFilter;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::path::PathBuf;

    async fn setup() -> (Arc<HistoricStore>, BaselineManager) {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let store = Arc::new(HistoricStore::new(pool.clone(), PathBuf::from("/tmp/bhm-test"), false));
        let manager = BaselineManager::new(pool, store.clone());
        (store, manager)
    }

    fn sample_run(id: &str, avg_latency_ms: f64) -> Run {
        Run {
            id: id.to_string(),
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
            total_errors: 10,
            overall_error_rate: 0.01,
            avg_latency_ms,
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

    #[tokio::test]
    async fn set_baseline_is_idempotent_by_name() {
        let (store, manager) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();

        let b1 = manager.set_baseline("r1", "b1", None, true).await.unwrap();
        let b2 = manager.set_baseline("r1", "b1", None, true).await.unwrap();
        assert_eq!(b1.id, b2.id);
        assert_eq!(b1.run_id, b2.run_id);
    }

    #[tokio::test]
    async fn compare_flags_latency_regression() {
        let (store, manager) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();
        manager.set_baseline("r1", "b1", None, true).await.unwrap();
        store.ingest_run(sample_run("r2", 225.0)).await.unwrap();

        let cmp = manager.compare_to_baseline("r2", "b1").await.unwrap();
        let latency = cmp.deltas.iter().find(|d| d.metric_key == "avg_latency_ms" && d.client == "*").unwrap();
        assert_eq!(latency.percent_change, Some(50.0));
        assert_eq!(latency.classification, DeltaClassification::Regression);
    }

    #[tokio::test]
    async fn list_runs_filter_default_is_all() {
        let (store, _manager) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();
        let runs = store.list_runs(&RunFilter::default()).await.unwrap();
        assert_eq!(runs.len(), 1);
    }
}

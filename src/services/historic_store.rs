//! H1: durable, queryable archive of benchmark runs.
//!
//! Grounded on the service-struct-wrapping-a-pool shape of
//! `organization_service.rs` and the "never fail outright, degrade and log"
//! posture of `baseline_service.rs`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::with_read_retry;
use crate::models::{Regression, Run, RunFilter, RunSummary};
use crate::utils::{ApiError, ApiResult};

pub struct HistoricStore {
    pool: SqlitePool,
    historic_root: PathBuf,
    enabled: bool,
}

/// Raw row shape as stored in SQLite; nested structures live in JSON text
/// columns and are parsed into the domain [`Run`] on the way out.
#[derive(FromRow)]
struct RunRow {
    id: String,
    test_name: String,
    timestamp: DateTime<Utc>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_secs: f64,
    git_commit: Option<String>,
    git_branch: Option<String>,
    target_rps: Option<f64>,
    client_list_json: String,
    method_list_json: String,
    total_requests: i64,
    total_errors: i64,
    overall_error_rate: f64,
    avg_latency_ms: f64,
    min_latency_ms: Option<f64>,
    p50_latency_ms: Option<f64>,
    p95_latency_ms: Option<f64>,
    p99_latency_ms: Option<f64>,
    max_latency_ms: Option<f64>,
    client_metrics_json: String,
    environment_json: Option<String>,
    is_baseline: bool,
    notes: Option<String>,
    artifact_path: Option<String>,
}

impl RunRow {
    fn into_run(self, tags: Vec<String>) -> ApiResult<Run> {
        Ok(Run {
            id: self.id,
            test_name: self.test_name,
            timestamp: self.timestamp,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_secs: self.duration_secs,
            git_commit: self.git_commit,
            git_branch: self.git_branch,
            tags,
            target_rps: self.target_rps,
            client_list: serde_json::from_str(&self.client_list_json)?,
            method_list: serde_json::from_str(&self.method_list_json)?,
            total_requests: self.total_requests,
            total_errors: self.total_errors,
            overall_error_rate: self.overall_error_rate,
            avg_latency_ms: self.avg_latency_ms,
            min_latency_ms: self.min_latency_ms,
            p50_latency_ms: self.p50_latency_ms,
            p95_latency_ms: self.p95_latency_ms,
            p99_latency_ms: self.p99_latency_ms,
            max_latency_ms: self.max_latency_ms,
            client_metrics: serde_json::from_str(&self.client_metrics_json)?,
            environment: match self.environment_json {
                Some(s) => Some(serde_json::from_str(&s)?),
                None => None,
            },
            is_baseline: self.is_baseline,
            notes: self.notes,
            artifact_path: self.artifact_path,
        })
    }
}

/// On-disk artifact bundle written alongside the relational row
/// (`<historic-root>/<run-id>/{result,summary,metadata}.json`).
#[derive(Serialize, Deserialize)]
struct ArtifactMetadata {
    run_id: String,
    test_name: String,
    ingested_at: DateTime<Utc>,
}

impl HistoricStore {
    pub fn new(pool: SqlitePool, historic_root: PathBuf, enabled: bool) -> Self {
        Self { pool, historic_root, enabled }
    }

    /// Validates, assigns an id if absent, and persists the run. The
    /// relational write is authoritative; the artifact bundle write is
    /// best-effort.
    pub async fn ingest_run(&self, mut run: Run) -> ApiResult<Run> {
        if run.id.trim().is_empty() {
            run.id = uuid::Uuid::new_v4().to_string();
        }
        run.validate()?;

        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM runs WHERE id = ?").bind(&run.id).fetch_optional(&mut *tx).await?;
        if existing.is_some() {
            return Err(ApiError::conflict(format!("run {} already exists", run.id)));
        }

        let client_list_json = serde_json::to_string(&run.client_list)?;
        let method_list_json = serde_json::to_string(&run.method_list)?;
        let client_metrics_json = serde_json::to_string(&run.client_metrics)?;
        let environment_json = run.environment.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO runs (
                id, test_name, timestamp, start_time, end_time, duration_secs,
                git_commit, git_branch, target_rps, client_list_json, method_list_json,
                total_requests, total_errors, overall_error_rate,
                avg_latency_ms, min_latency_ms, p50_latency_ms, p95_latency_ms, p99_latency_ms, max_latency_ms,
                client_metrics_json, environment_json, is_baseline, notes, artifact_path
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.test_name)
        .bind(run.timestamp)
        .bind(run.start_time)
        .bind(run.end_time)
        .bind(run.duration_secs)
        .bind(&run.git_commit)
        .bind(&run.git_branch)
        .bind(run.target_rps)
        .bind(&client_list_json)
        .bind(&method_list_json)
        .bind(run.total_requests)
        .bind(run.total_errors)
        .bind(run.overall_error_rate)
        .bind(run.avg_latency_ms)
        .bind(run.min_latency_ms)
        .bind(run.p50_latency_ms)
        .bind(run.p95_latency_ms)
        .bind(run.p99_latency_ms)
        .bind(run.max_latency_ms)
        .bind(&client_metrics_json)
        .bind(&environment_json)
        .bind(run.is_baseline)
        .bind(&run.notes)
        .bind(&run.artifact_path)
        .execute(&mut *tx)
        .await?;

        for tag in &run.tags {
            sqlx::query("INSERT INTO run_tags (run_id, tag) VALUES (?, ?)")
                .bind(&run.id)
                .bind(tag)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        run.artifact_path = self.write_artifact_bundle(&run).await;

        tracing::info!(run_id = %run.id, test_name = %run.test_name, "run ingested");
        Ok(run)
    }

    /// Writes the artifact bundle; returns `None` (never an error) on
    /// failure, per the best-effort-atomic contract in
    async fn write_artifact_bundle(&self, run: &Run) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let dir = self.historic_root.join(&run.id);
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(run_id = %run.id, error = %err, "failed to create artifact directory");
            return None;
        }

        let result = async {
            let result_json = serde_json::to_vec_pretty(run)?;
            tokio::fs::write(dir.join("result.json"), result_json).await?;

            let metadata = ArtifactMetadata {
                run_id: run.id.clone(),
                test_name: run.test_name.clone(),
                ingested_at: Utc::now(),
            };
            tokio::fs::write(dir.join("metadata.json"), serde_json::to_vec_pretty(&metadata)?).await?;
            Ok::<(), anyhow::Error>(())
        }
        .await;

        match result {
            Ok(()) => Some(dir.to_string_lossy().into_owned()),
            Err(err) => {
                tracing::warn!(run_id = %run.id, error = %err, "failed to write artifact bundle");
                None
            },
        }
    }

    pub async fn get_run(&self, id: &str) -> ApiResult<Run> {
        let row: RunRow = with_read_retry(|| {
            sqlx::query_as(
                r#"SELECT id, test_name, timestamp, start_time, end_time, duration_secs,
                   git_commit, git_branch, target_rps, client_list_json, method_list_json,
                   total_requests, total_errors, overall_error_rate,
                   avg_latency_ms, min_latency_ms, p50_latency_ms, p95_latency_ms, p99_latency_ms, max_latency_ms,
                   client_metrics_json, environment_json, is_baseline, notes, artifact_path
                   FROM runs WHERE id = ?"#,
            )
            .bind(id)
            .fetch_one(&self.pool)
        })
        .await?;

        let tags = self.load_tags(id).await?;
        row.into_run(tags)
    }

    async fn load_tags(&self, run_id: &str) -> ApiResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT tag FROM run_tags WHERE run_id = ? ORDER BY tag").bind(run_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    /// Ordered timestamp DESC, tie-break id DESC; offset-based pagination.
    pub async fn list_runs(&self, filter: &RunFilter) -> ApiResult<Vec<Run>> {
        let mut sql = String::from(
            "SELECT DISTINCT r.id, r.test_name, r.timestamp, r.start_time, r.end_time, r.duration_secs, \
             r.git_commit, r.git_branch, r.target_rps, r.client_list_json, r.method_list_json, \
             r.total_requests, r.total_errors, r.overall_error_rate, \
             r.avg_latency_ms, r.min_latency_ms, r.p50_latency_ms, r.p95_latency_ms, r.p99_latency_ms, r.max_latency_ms, \
             r.client_metrics_json, r.environment_json, r.is_baseline, r.notes, r.artifact_path \
             FROM runs r",
        );
        if !filter.tags.is_empty() {
            sql.push_str(" JOIN run_tags rt ON rt.run_id = r.id");
        }
        sql.push_str(" WHERE 1=1");
        if filter.test_name.is_some() {
            sql.push_str(" AND r.test_name = ?");
        }
        if filter.git_branch.is_some() {
            sql.push_str(" AND r.git_branch = ?");
        }
        if filter.client.is_some() {
            sql.push_str(" AND r.client_metrics_json LIKE ?");
        }
        if filter.method.is_some() {
            sql.push_str(" AND r.client_metrics_json LIKE ?");
        }
        if filter.is_baseline.is_some() {
            sql.push_str(" AND r.is_baseline = ?");
        }
        if filter.from.is_some() {
            sql.push_str(" AND r.timestamp >= ?");
        }
        if filter.to.is_some() {
            sql.push_str(" AND r.timestamp <= ?");
        }
        if !filter.tags.is_empty() {
            sql.push_str(&format!(" AND rt.tag IN ({})", vec!["?"; filter.tags.len()].join(",")));
        }
        sql.push_str(" ORDER BY r.timestamp DESC, r.id DESC LIMIT ? OFFSET ?");

        // Built fresh inside the closure on every attempt: `QueryAs` is
        // consumed by `fetch_all`, so a retry needs its own instance.
        let rows: Vec<RunRow> = with_read_retry(|| {
            let mut query = sqlx::query_as::<_, RunRow>(&sql);
            if let Some(v) = &filter.test_name {
                query = query.bind(v);
            }
            if let Some(v) = &filter.git_branch {
                query = query.bind(v);
            }
            if let Some(v) = &filter.client {
                query = query.bind(format!("%\"{v}\"%"));
            }
            if let Some(v) = &filter.method {
                query = query.bind(format!("%\"{v}\"%"));
            }
            if let Some(v) = filter.is_baseline {
                query = query.bind(v);
            }
            if let Some(v) = filter.from {
                query = query.bind(v);
            }
            if let Some(v) = filter.to {
                query = query.bind(v);
            }
            for tag in &filter.tags {
                query = query.bind(tag);
            }
            query = query.bind(filter.limit.unwrap_or(100).clamp(1, 1000));
            query = query.bind(filter.offset.unwrap_or(0).max(0));
            query.fetch_all(&self.pool)
        })
        .await?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            let tags = self.load_tags(&id).await?;
            runs.push(row.into_run(tags)?);
        }
        Ok(runs)
    }

    /// Cascades to regressions and to any baseline whose source run is
    /// `id`.
    pub async fn delete_run(&self, id: &str) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM runs WHERE id = ?").bind(id).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("run {id}")));
        }
        // `regressions.run_id` and `run_tags.run_id` cascade via FK; SQLite
        // baselines have no FK-cascade on purpose (RESTRICT), so delete
        // explicitly to honour the "cascade the baseline, not block" policy.
        sqlx::query("DELETE FROM baselines WHERE run_id = ?").bind(id).execute(&mut *tx).await?;

        tx.commit().await?;

        let dir = self.historic_root.join(id);
        if dir.exists() {
            if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                tracing::warn!(run_id = %id, error = %err, "failed to remove artifact directory");
            }
        }

        tracing::info!(run_id = %id, "run deleted");
        Ok(())
    }

    /// Ranks best/worst by composite of (low avg-latency, low error-rate).
    pub async fn summary(&self, test_name: &str) -> ApiResult<RunSummary> {
        let runs = self
            .list_runs(&RunFilter { test_name: Some(test_name.to_string()), limit: Some(10_000), ..Default::default() })
            .await?;

        if runs.is_empty() {
            return Ok(RunSummary {
                test_name: test_name.to_string(),
                total_runs: 0,
                first_run: None,
                last_run: None,
                best_run_id: None,
                worst_run_id: None,
            });
        }

        let first_run = runs.iter().map(|r| r.timestamp).min();
        let last_run = runs.iter().map(|r| r.timestamp).max();

        let score = |r: &Run| (r.avg_latency_ms, r.overall_error_rate);
        let best = runs.iter().min_by(|a, b| score(a).partial_cmp(&score(b)).unwrap());
        let worst = runs.iter().max_by(|a, b| score(a).partial_cmp(&score(b)).unwrap());

        Ok(RunSummary {
            test_name: test_name.to_string(),
            total_runs: runs.len() as i64,
            first_run,
            last_run,
            best_run_id: best.map(|r| r.id.clone()),
            worst_run_id: worst.map(|r| r.id.clone()),
        })
    }

    /// Enforces retention by timestamp: deletes files first, then
    /// relational rows, so a crash mid-sweep just re-attempts next cycle.
    pub async fn cleanup(&self, retention_days: i64) -> ApiResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let expired: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM runs WHERE timestamp < ?").bind(cutoff).fetch_all(&self.pool).await?;

        let mut deleted = 0;
        for (id,) in expired {
            let dir = self.historic_root.join(&id);
            if dir.exists() {
                if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                    tracing::warn!(run_id = %id, error = %err, "retention sweep: file removal failed, retrying next cycle");
                    continue;
                }
            }
            match sqlx::query("DELETE FROM runs WHERE id = ?").bind(&id).execute(&self.pool).await {
                Ok(_) => deleted += 1,
                Err(err) => tracing::warn!(run_id = %id, error = %err, "retention sweep: row delete failed"),
            }
        }

        if deleted > 0 {
            tracing::info!(deleted, retention_days, "retention sweep complete");
        }
        Ok(deleted)
    }

    /// Upsert-by-id persistence for detection results.
    pub async fn save_regressions(&self, regressions: &[Regression]) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;
        for r in regressions {
            sqlx::query(
                r#"
                INSERT INTO regressions (
                    id, run_id, baseline_run_id, client, method, metric_key,
                    baseline_value, current_value, absolute_change, percent_change,
                    severity, is_significant, p_value, detected_at,
                    acknowledged_at, acknowledged_by, notes
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    severity = excluded.severity,
                    is_significant = excluded.is_significant,
                    p_value = excluded.p_value,
                    current_value = excluded.current_value,
                    absolute_change = excluded.absolute_change,
                    percent_change = excluded.percent_change
                "#,
            )
            .bind(&r.id)
            .bind(&r.run_id)
            .bind(&r.baseline_run_id)
            .bind(&r.client)
            .bind(&r.method)
            .bind(&r.metric_key)
            .bind(r.baseline_value)
            .bind(r.current_value)
            .bind(r.absolute_change)
            .bind(r.percent_change)
            .bind(severity_str(r.severity))
            .bind(r.is_significant)
            .bind(r.p_value)
            .bind(r.detected_at)
            .bind(r.acknowledged_at)
            .bind(&r.acknowledged_by)
            .bind(&r.notes)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_regressions(&self, run_id: Option<&str>) -> ApiResult<Vec<Regression>> {
        let rows: Vec<RegressionRow> = if let Some(run_id) = run_id {
            sqlx::query_as("SELECT * FROM regressions WHERE run_id = ? ORDER BY detected_at DESC")
                .bind(run_id)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT * FROM regressions ORDER BY detected_at DESC").fetch_all(&self.pool).await?
        };
        rows.into_iter().map(RegressionRow::into_regression).collect()
    }

    pub async fn acknowledge_regression(&self, id: &str, by: &str, notes: Option<String>) -> ApiResult<Regression> {
        let result = sqlx::query(
            "UPDATE regressions SET acknowledged_at = COALESCE(acknowledged_at, ?), acknowledged_by = COALESCE(acknowledged_by, ?), notes = COALESCE(?, notes) WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(by)
        .bind(&notes)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("regression {id}")));
        }

        let row: RegressionRow =
            sqlx::query_as("SELECT * FROM regressions WHERE id = ?").bind(id).fetch_one(&self.pool).await?;
        row.into_regression()
    }
}

#[derive(FromRow)]
struct RegressionRow {
    id: String,
    run_id: String,
    baseline_run_id: Option<String>,
    client: String,
    method: Option<String>,
    metric_key: String,
    baseline_value: f64,
    current_value: f64,
    absolute_change: f64,
    percent_change: f64,
    severity: String,
    is_significant: bool,
    p_value: Option<f64>,
    detected_at: DateTime<Utc>,
    acknowledged_at: Option<DateTime<Utc>>,
    acknowledged_by: Option<String>,
    notes: Option<String>,
}

impl RegressionRow {
    fn into_regression(self) -> ApiResult<Regression> {
        Ok(Regression {
            id: self.id,
            run_id: self.run_id,
            baseline_run_id: self.baseline_run_id,
            client: self.client,
            method: self.method,
            metric_key: self.metric_key,
            baseline_value: self.baseline_value,
            current_value: self.current_value,
            absolute_change: self.absolute_change,
            percent_change: self.percent_change,
            severity: severity_from_str(&self.severity)?,
            is_significant: self.is_significant,
            p_value: self.p_value,
            detected_at: self.detected_at,
            acknowledged_at: self.acknowledged_at,
            acknowledged_by: self.acknowledged_by,
            notes: self.notes,
        })
    }
}

fn severity_str(s: crate::models::Severity) -> &'static str {
    use crate::models::Severity::*;
    match s {
        Minor => "minor",
        Major => "major",
        Critical => "critical",
    }
}

fn severity_from_str(s: &str) -> ApiResult<crate::models::Severity> {
    use crate::models::Severity::*;
    match s {
        "minor" => Ok(Minor),
        "major" => Ok(Major),
        "critical" => Ok(Critical),
        other => Err(ApiError::internal(format!("unknown severity in storage: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> HistoricStore {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        HistoricStore::new(pool, std::env::temp_dir().join("bench-historian-test"), false)
    }

    fn sample_run(id: &str) -> Run {
        Run {
            id: id.to_string(),
            test_name: "T".to_string(),
            timestamp: Utc::now(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration_secs: 60.0,
            git_commit: None,
            git_branch: Some("main".to_string()),
            tags: vec!["nightly".to_string()],
            target_rps: Some(100.0),
            client_list: vec!["geth".to_string()],
            method_list: vec!["eth_getBalance".to_string()],
            total_requests: 1000,
            total_errors: 10,
            overall_error_rate: 0.01,
            avg_latency_ms: 150.0,
            min_latency_ms: Some(10.0),
            p50_latency_ms: Some(100.0),
            p95_latency_ms: Some(300.0),
            p99_latency_ms: Some(500.0),
            max_latency_ms: Some(600.0),
            client_metrics: std::collections::HashMap::new(),
            environment: None,
            is_baseline: false,
            notes: None,
            artifact_path: None,
        }
    }

    #[tokio::test]
    async fn ingest_then_get_round_trips() {
        let store = test_store().await;
        store.ingest_run(sample_run("r1")).await.unwrap();
        let fetched = store.get_run("r1").await.unwrap();
        assert_eq!(fetched.avg_latency_ms, 150.0);
        assert_eq!(fetched.tags, vec!["nightly".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_id_is_conflict() {
        let store = test_store().await;
        store.ingest_run(sample_run("r1")).await.unwrap();
        let err = store.ingest_run(sample_run("r1")).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_run_is_not_found() {
        let store = test_store().await;
        let err = store.get_run("missing").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_cascades_regressions_and_baselines() {
        let store = test_store().await;
        store.ingest_run(sample_run("r1")).await.unwrap();
        store
            .save_regressions(&[Regression {
                id: "reg1".to_string(),
                run_id: "r1".to_string(),
                baseline_run_id: None,
                client: "geth".to_string(),
                method: None,
                metric_key: "latency_ms".to_string(),
                baseline_value: 100.0,
                current_value: 150.0,
                absolute_change: 50.0,
                percent_change: 50.0,
                severity: crate::models::Severity::Major,
                is_significant: false,
                p_value: None,
                detected_at: Utc::now(),
                acknowledged_at: None,
                acknowledged_by: None,
                notes: None,
            }])
            .await
            .unwrap();

        store.delete_run("r1").await.unwrap();
        assert!(store.list_regressions(Some("r1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_runs_orders_timestamp_desc() {
        let store = test_store().await;
        let mut r1 = sample_run("r1");
        r1.timestamp = Utc::now() - chrono::Duration::hours(1);
        let r2 = sample_run("r2");
        store.ingest_run(r1).await.unwrap();
        store.ingest_run(r2).await.unwrap();

        let runs = store.list_runs(&RunFilter::default()).await.unwrap();
        assert_eq!(runs[0].id, "r2");
        assert_eq!(runs[1].id, "r1");
    }
}

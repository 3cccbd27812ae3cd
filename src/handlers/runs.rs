use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{analyze_run, MethodMatrixRow, Run, RunAnalysis, RunFilter, RunSummary};
use crate::services::diff_runs;
use crate::services::Comparison;
use crate::utils::ApiResult;
use crate::AppState;

/// Query-string shape for `GET /api/runs`. `tags` is accepted as
/// a single comma-separated value since axum's `Query` extractor doesn't
/// repeat-parse array params.
#[derive(Debug, Deserialize)]
pub struct RunListQuery {
    pub test_name: Option<String>,
    pub git_branch: Option<String>,
    pub client: Option<String>,
    pub method: Option<String>,
    pub is_baseline: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub tags: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<RunListQuery> for RunFilter {
    fn from(q: RunListQuery) -> Self {
        RunFilter {
            test_name: q.test_name,
            git_branch: q.git_branch,
            client: q.client,
            method: q.method,
            is_baseline: q.is_baseline,
            from: q.from,
            to: q.to,
            tags: q.tags.map(|s| s.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()).unwrap_or_default(),
            limit: q.limit,
            offset: q.offset,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/runs",
    params(
        ("test_name" = Option<String>, Query, description = "Filter by test name"),
        ("git_branch" = Option<String>, Query, description = "Filter by git branch"),
        ("client" = Option<String>, Query, description = "Filter by client name"),
        ("method" = Option<String>, Query, description = "Filter by JSON-RPC method"),
        ("is_baseline" = Option<bool>, Query, description = "Filter by baseline flag"),
        ("from" = Option<String>, Query, description = "RFC3339 lower bound"),
        ("to" = Option<String>, Query, description = "RFC3339 upper bound"),
        ("tags" = Option<String>, Query, description = "Comma-separated tag list"),
        ("limit" = Option<i64>, Query, description = "Page size, default 100, max 1000"),
        ("offset" = Option<i64>, Query, description = "Page offset"),
    ),
    responses((status = 200, description = "Matching runs", body = Vec<Run>)),
    tag = "Runs"
)]
pub async fn list_runs(State(state): State<Arc<AppState>>, Query(query): Query<RunListQuery>) -> ApiResult<Json<Vec<Run>>> {
    let runs = state.historic_store.list_runs(&query.into()).await?;
    Ok(Json(runs))
}

#[utoipa::path(
    post,
    path = "/api/runs",
    request_body = Run,
    responses(
        (status = 200, description = "Run ingested", body = Run),
        (status = 409, description = "Run id already exists"),
    ),
    tag = "Runs"
)]
pub async fn ingest_run(State(state): State<Arc<AppState>>, Json(run): Json<Run>) -> ApiResult<Json<Run>> {
    let ingested = state.historic_store.ingest_run(run).await?;
    state.push_channel.publish(crate::services::PushEvent::new_run(&ingested));
    Ok(Json(ingested))
}

#[utoipa::path(
    get,
    path = "/api/runs/{id}",
    params(("id" = String, Path, description = "Run id")),
    responses(
        (status = 200, description = "The run", body = Run),
        (status = 404, description = "No such run"),
    ),
    tag = "Runs"
)]
pub async fn get_run(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<Run>> {
    let run = state.historic_store.get_run(&id).await?;
    Ok(Json(run))
}

#[utoipa::path(
    delete,
    path = "/api/runs/{id}",
    params(("id" = String, Path, description = "Run id")),
    responses(
        (status = 204, description = "Run deleted; regressions and baselines cascade"),
        (status = 404, description = "No such run"),
    ),
    tag = "Runs"
)]
pub async fn delete_run(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<axum::http::StatusCode> {
    state.historic_store.delete_run(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/runs/{id}/methods",
    params(("id" = String, Path, description = "Run id")),
    responses((status = 200, description = "Per-method matrix", body = Vec<MethodMatrixRow>)),
    tag = "Runs"
)]
pub async fn run_methods(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<Vec<MethodMatrixRow>>> {
    let run = state.historic_store.get_run(&id).await?;
    Ok(Json(run.methods_matrix()))
}

#[utoipa::path(
    get,
    path = "/api/runs/{id}/compare/{otherId}",
    params(
        ("id" = String, Path, description = "Current run id"),
        ("otherId" = String, Path, description = "Run id to diff against"),
    ),
    responses((status = 200, description = "Per-metric diff between the two runs", body = Comparison)),
    tag = "Runs"
)]
pub async fn compare_runs(State(state): State<Arc<AppState>>, Path((id, other_id)): Path<(String, String)>) -> ApiResult<Json<Comparison>> {
    let current = state.historic_store.get_run(&id).await?;
    let other = state.historic_store.get_run(&other_id).await?;
    Ok(Json(diff_runs(&current, &other)))
}

#[utoipa::path(
    post,
    path = "/api/runs/{id}/analyze",
    params(("id" = String, Path, description = "Run id")),
    responses((status = 200, description = "Quality score and self-contained anomaly flags", body = RunAnalysis)),
    tag = "Runs"
)]
pub async fn analyze(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<RunAnalysis>> {
    let run = state.historic_store.get_run(&id).await?;
    Ok(Json(analyze_run(&run)))
}

#[utoipa::path(
    get,
    path = "/api/tests/{name}/summary",
    params(("name" = String, Path, description = "Test name")),
    responses((status = 200, description = "Run count / best / worst summary", body = RunSummary)),
    tag = "Runs"
)]
pub async fn test_summary(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ApiResult<Json<RunSummary>> {
    let summary = state.historic_store.summary(&name).await?;
    Ok(Json(summary))
}

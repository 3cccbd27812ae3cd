use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::models::{Baseline, SetBaselineRequest};
use crate::services::Comparison;
use crate::utils::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListBaselinesQuery {
    pub test_name: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/baselines",
    params(("test_name" = Option<String>, Query, description = "Restrict to one test")),
    responses((status = 200, description = "Baselines", body = Vec<Baseline>)),
    tag = "Baselines"
)]
pub async fn list_baselines(State(state): State<Arc<AppState>>, Query(query): Query<ListBaselinesQuery>) -> ApiResult<Json<Vec<Baseline>>> {
    let baselines = state.baseline_manager.list_baselines(query.test_name.as_deref()).await?;
    Ok(Json(baselines))
}

#[utoipa::path(
    post,
    path = "/api/baselines",
    request_body = SetBaselineRequest,
    responses(
        (status = 201, description = "Baseline created/updated", body = Baseline),
        (status = 404, description = "Source run does not exist"),
    ),
    tag = "Baselines"
)]
pub async fn set_baseline(State(state): State<Arc<AppState>>, Json(req): Json<SetBaselineRequest>) -> ApiResult<(axum::http::StatusCode, Json<Baseline>)> {
    let baseline = state.baseline_manager.set_baseline(&req.run_id, &req.name, req.description, req.activate).await?;
    state.push_channel.publish(crate::services::PushEvent::baseline_updated(&baseline.name, &baseline.test_name));
    Ok((axum::http::StatusCode::CREATED, Json(baseline)))
}

#[utoipa::path(
    get,
    path = "/api/baselines/{name}",
    params(("name" = String, Path, description = "Baseline name")),
    responses(
        (status = 200, description = "The baseline", body = Baseline),
        (status = 404, description = "No such baseline"),
    ),
    tag = "Baselines"
)]
pub async fn get_baseline(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ApiResult<Json<Baseline>> {
    let baseline = state.baseline_manager.get_baseline(&name).await?;
    Ok(Json(baseline))
}

#[utoipa::path(
    delete,
    path = "/api/baselines/{name}",
    params(("name" = String, Path, description = "Baseline name")),
    responses(
        (status = 204, description = "Baseline deleted"),
        (status = 404, description = "No such baseline"),
    ),
    tag = "Baselines"
)]
pub async fn delete_baseline(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ApiResult<axum::http::StatusCode> {
    state.baseline_manager.delete_baseline(&name).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/baselines/{name}/compare/{runId}",
    params(
        ("name" = String, Path, description = "Baseline name"),
        ("runId" = String, Path, description = "Run to compare against the baseline"),
    ),
    responses((status = 200, description = "Per-metric delta classification", body = Comparison)),
    tag = "Baselines"
)]
pub async fn compare_to_baseline(State(state): State<Arc<AppState>>, Path((name, run_id)): Path<(String, String)>) -> ApiResult<Json<Comparison>> {
    let comparison = state.baseline_manager.compare_to_baseline(&run_id, &name).await?;
    Ok(Json(comparison))
}

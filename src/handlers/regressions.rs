use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::models::{AcknowledgeRegressionRequest, DetectionOptions, Regression, RegressionReport, Threshold, ThresholdTable};
use crate::utils::ApiResult;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/regressions/detect/{runId}",
    params(("runId" = String, Path, description = "Run to analyze")),
    request_body = DetectionOptions,
    responses(
        (status = 200, description = "Regression report", body = RegressionReport),
        (status = 422, description = "Baseline mode without a resolvable baseline"),
    ),
    tag = "Regressions"
)]
pub async fn detect(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    Json(options): Json<DetectionOptions>,
) -> ApiResult<Json<RegressionReport>> {
    let report = state.regression_detector.detect_regressions(&run_id, options).await?;
    for regression in &report.regressions {
        state.push_channel.publish(crate::services::PushEvent::regression_detected(regression));
    }
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct ListRegressionsQuery {
    pub run_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/regressions",
    params(("run_id" = Option<String>, Query, description = "Restrict to one run")),
    responses((status = 200, description = "Persisted regressions", body = Vec<Regression>)),
    tag = "Regressions"
)]
pub async fn list_regressions(State(state): State<Arc<AppState>>, Query(query): Query<ListRegressionsQuery>) -> ApiResult<Json<Vec<Regression>>> {
    let regressions = state.historic_store.list_regressions(query.run_id.as_deref()).await?;
    Ok(Json(regressions))
}

#[utoipa::path(
    post,
    path = "/api/regressions/{id}/ack",
    params(("id" = String, Path, description = "Regression id")),
    request_body = AcknowledgeRegressionRequest,
    responses(
        (status = 200, description = "Acknowledged regression", body = Regression),
        (status = 404, description = "No such regression"),
    ),
    tag = "Regressions"
)]
pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AcknowledgeRegressionRequest>,
) -> ApiResult<Json<Regression>> {
    let regression = state.historic_store.acknowledge_regression(&id, &req.acknowledged_by, req.notes).await?;
    Ok(Json(regression))
}

#[utoipa::path(
    get,
    path = "/api/regressions/thresholds",
    responses((status = 200, description = "Current per-metric threshold table", body = ThresholdTable)),
    tag = "Regressions"
)]
pub async fn get_thresholds(State(state): State<Arc<AppState>>) -> Json<ThresholdTable> {
    Json(state.regression_detector.get_thresholds().await)
}

#[utoipa::path(
    put,
    path = "/api/regressions/thresholds",
    request_body = Threshold,
    responses((status = 204, description = "Threshold stored")),
    tag = "Regressions"
)]
pub async fn set_threshold(State(state): State<Arc<AppState>>, Json(threshold): Json<Threshold>) -> axum::http::StatusCode {
    state.regression_detector.set_threshold(threshold).await;
    axum::http::StatusCode::NO_CONTENT
}

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::models::TrendSeries;
use crate::services::trend_analyzer::TrendQuery;
use crate::utils::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TrendQueryParams {
    pub metric_key: String,
    pub client: Option<String>,
    pub days: Option<i64>,
    pub forecast_horizon: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/api/tests/{name}/trends",
    params(
        ("name" = String, Path, description = "Test name"),
        ("metric_key" = String, Query, description = "Metric to trend, e.g. avg_latency_ms"),
        ("client" = Option<String>, Query, description = "Restrict to one client"),
        ("days" = Option<i64>, Query, description = "Lookback window in days, default 30"),
        ("forecast_horizon" = Option<usize>, Query, description = "Extrapolate this many points past the window"),
    ),
    responses(
        (status = 200, description = "Trend series with slope/strength/direction and optional forecast", body = TrendSeries),
        (status = 400, description = "Unknown metric_key"),
    ),
    tag = "Trends"
)]
pub async fn test_trends(State(state): State<Arc<AppState>>, Path(name): Path<String>, Query(params): Query<TrendQueryParams>) -> ApiResult<Json<TrendSeries>> {
    let days = params.days.unwrap_or(30);
    if days <= 0 {
        return Err(ApiError::invalid_input("days must be positive"));
    }
    let to = Utc::now();
    let from = to - chrono::Duration::days(days);

    let series = state
        .trend_analyzer
        .get_trend(TrendQuery { test_name: name, metric_key: params.metric_key, client: params.client, from, to, forecast_horizon: params.forecast_horizon })
        .await?;
    Ok(Json(series))
}

//! Grafana SimpleJSON datasource surface: a minimal
//! `search` / `query` / `tag-keys` / `tag-values` quartet so a Grafana
//! dashboard can plot historic metrics without a purpose-built plugin.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::RunFilter;
use crate::services::trend_analyzer::TrendQuery;
use crate::utils::ApiResult;
use crate::AppState;

const KNOWN_METRICS: &[&str] = &["error_rate", "avg_latency_ms", "p50_latency_ms", "p95_latency_ms", "p99_latency_ms", "max_latency_ms", "throughput_rps"];

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub target: Option<String>,
}

#[utoipa::path(
    post,
    path = "/grafana/search",
    request_body = SearchRequest,
    responses((status = 200, description = "Known `<test>.<metric>` target strings", body = Vec<String>)),
    tag = "SimpleJSON"
)]
pub async fn search(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> ApiResult<Json<Vec<String>>> {
    let test_names = distinct_test_names(&state).await?;
    let mut targets: Vec<String> = test_names.iter().flat_map(|t| KNOWN_METRICS.iter().map(move |m| format!("{t}.{m}"))).collect();
    if let Some(needle) = req.target.as_deref().filter(|s| !s.is_empty()) {
        targets.retain(|t| t.contains(needle));
    }
    targets.sort();
    Ok(Json(targets))
}

#[derive(Debug, Deserialize)]
pub struct QueryRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct QueryTarget {
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub range: QueryRange,
    pub targets: Vec<QueryTarget>,
    #[serde(default)]
    pub max_data_points: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TimeseriesResponse {
    pub target: String,
    /// `[value, epoch_millis]` pairs, per the SimpleJSON timeseries shape.
    pub datapoints: Vec<(f64, i64)>,
}

#[utoipa::path(
    post,
    path = "/grafana/query",
    request_body = QueryRequest,
    responses((status = 200, description = "Timeseries for each requested target", body = Vec<TimeseriesResponse>)),
    tag = "SimpleJSON"
)]
pub async fn query(State(state): State<Arc<AppState>>, Json(req): Json<QueryRequest>) -> ApiResult<Json<Vec<TimeseriesResponse>>> {
    let cap = req.max_data_points.unwrap_or(state.config.simplejson.max_data_points);
    let mut out = Vec::with_capacity(req.targets.len());
    for t in &req.targets {
        let Some((test_name, metric_key, client)) = parse_target(&t.target) else { continue };
        let series = state
            .trend_analyzer
            .get_trend(TrendQuery { test_name, metric_key, client, from: req.range.from, to: req.range.to, forecast_horizon: None })
            .await?;
        let points: Vec<(f64, i64)> = series.points.iter().map(|p| (p.value, p.timestamp.timestamp_millis())).collect();
        out.push(TimeseriesResponse { target: t.target.clone(), datapoints: downsample(points, cap) });
    }
    Ok(Json(out))
}

/// Splits `<test>.<metric>[.client]` into its parts. `metric` must be one
/// of the known aggregate keys; everything after it is the client name
/// (rejoined, in case a client name itself contains a dot).
fn parse_target(target: &str) -> Option<(String, String, Option<String>)> {
    let parts: Vec<&str> = target.split('.').collect();
    for metric in KNOWN_METRICS {
        if let Some(pos) = parts.iter().position(|p| p == metric) {
            if pos == 0 {
                continue;
            }
            let test_name = parts[..pos].join(".");
            let client = if pos + 1 < parts.len() { Some(parts[pos + 1..].join(".")) } else { None };
            return Some((test_name, metric.to_string(), client));
        }
    }
    None
}

/// Bucket-mean downsampling to at most `cap` points; a no-op when the
/// series already fits.
fn downsample(points: Vec<(f64, i64)>, cap: usize) -> Vec<(f64, i64)> {
    if cap == 0 || points.len() <= cap {
        return points;
    }
    let bucket_size = (points.len() as f64 / cap as f64).ceil() as usize;
    points
        .chunks(bucket_size.max(1))
        .map(|chunk| {
            let n = chunk.len() as f64;
            let value = chunk.iter().map(|(v, _)| v).sum::<f64>() / n;
            let ts = chunk[chunk.len() / 2].1;
            (value, ts)
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct TagValuesRequest {
    pub key: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TagKey {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: &'static str,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TagValue {
    pub text: String,
}

#[utoipa::path(
    post,
    path = "/grafana/tag-keys",
    responses((status = 200, description = "Annotatable tag keys", body = Vec<TagKey>)),
    tag = "SimpleJSON"
)]
pub async fn tag_keys() -> Json<Vec<TagKey>> {
    Json(vec![TagKey { kind: "string", text: "test_name" }, TagKey { kind: "string", text: "client" }])
}

#[utoipa::path(
    post,
    path = "/grafana/tag-values",
    request_body = TagValuesRequest,
    responses((status = 200, description = "Values for a tag key", body = Vec<TagValue>)),
    tag = "SimpleJSON"
)]
pub async fn tag_values(State(state): State<Arc<AppState>>, Json(req): Json<TagValuesRequest>) -> ApiResult<Json<Vec<TagValue>>> {
    let values = match req.key.as_str() {
        "test_name" => distinct_test_names(&state).await?,
        "client" => distinct_clients(&state).await?,
        _ => Vec::new(),
    };
    Ok(Json(values.into_iter().map(|text| TagValue { text }).collect()))
}

async fn distinct_test_names(state: &AppState) -> ApiResult<Vec<String>> {
    let runs = state.historic_store.list_runs(&RunFilter { limit: Some(10_000), ..Default::default() }).await?;
    let mut names: Vec<String> = runs.into_iter().map(|r| r.test_name).collect();
    names.sort();
    names.dedup();
    Ok(names)
}

async fn distinct_clients(state: &AppState) -> ApiResult<Vec<String>> {
    let runs = state.historic_store.list_runs(&RunFilter { limit: Some(10_000), ..Default::default() }).await?;
    let mut clients: Vec<String> = runs.into_iter().flat_map(|r| r.client_metrics.into_keys()).collect();
    clients.sort();
    clients.dedup();
    Ok(clients)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_target_splits_test_metric_client() {
        let (test_name, metric, client) = parse_target("T.avg_latency_ms.geth").unwrap();
        assert_eq!(test_name, "T");
        assert_eq!(metric, "avg_latency_ms");
        assert_eq!(client.as_deref(), Some("geth"));
    }

    #[test]
    fn parse_target_without_client_is_aggregate() {
        let (test_name, metric, client) = parse_target("my.dotted.test.p99_latency_ms").unwrap();
        assert_eq!(test_name, "my.dotted.test");
        assert_eq!(metric, "p99_latency_ms");
        assert!(client.is_none());
    }

    #[test]
    fn parse_target_rejects_unknown_metric() {
        assert!(parse_target("T.not_a_metric").is_none());
    }

    /// Downsampling never reorders points — each bucket's timestamp stays
    /// ≤ the next bucket's.
    #[test]
    fn downsample_preserves_time_order() {
        let points: Vec<(f64, i64)> = (0..97).map(|i| (i as f64, i as i64 * 1000)).collect();
        let downsampled = downsample(points, 10);
        assert!(downsampled.len() <= 10);
        for pair in downsampled.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn downsample_is_noop_under_cap() {
        let points = vec![(1.0, 100), (2.0, 200)];
        assert_eq!(downsample(points.clone(), 100), points);
    }
}

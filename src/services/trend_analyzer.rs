//! H3: multi-run time-series reduction and direction/forecast inference.
//!
//! Grounded on the sorted-vector + index-lookup percentile style of
//! `BaselineCalculator`, generalized to a linear-regression trend fit.
//! Stateless: never mutates state.

use std::sync::Arc;

use crate::models::{TrendDirection, TrendPoint, TrendSeries, MIN_POINTS_FOR_TREND, STABILITY_THRESHOLD};
use crate::services::historic_store::HistoricStore;
use crate::utils::ApiResult;

pub struct TrendAnalyzer {
    store: Arc<HistoricStore>,
}

pub struct TrendQuery {
    pub test_name: String,
    pub metric_key: String,
    pub client: Option<String>,
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
    pub forecast_horizon: Option<usize>,
}

impl TrendAnalyzer {
    pub fn new(store: Arc<HistoricStore>) -> Self {
        Self { store }
    }

    pub async fn get_trend(&self, query: TrendQuery) -> ApiResult<TrendSeries> {
        let runs = self
            .store
            .list_runs(&crate::models::RunFilter {
                test_name: Some(query.test_name.clone()),
                from: Some(query.from),
                to: Some(query.to),
                limit: Some(10_000),
                ..Default::default()
            })
            .await?;

        // list_runs returns DESC; the trend needs ASC (oldest first).
        let mut ordered = runs;
        ordered.sort_by_key(|r| r.timestamp);

        let points: Vec<TrendPoint> = ordered
            .iter()
            .filter_map(|run| extract_metric(run, &query.metric_key, query.client.as_deref()).map(|value| TrendPoint { run_id: run.id.clone(), timestamp: run.timestamp, value }))
            .collect();

        Ok(build_trend_series(query.test_name, query.client, query.metric_key, points, query.forecast_horizon))
    }
}

/// Pulls `metric_key` out of a run, optionally scoped to one client. Known
/// aggregate keys map to the run's summary columns; anything else is
/// looked up inside the per-client blob; unknown keys yield `None` rather
/// than a fabricated zero.
fn extract_metric(run: &crate::models::Run, metric_key: &str, client: Option<&str>) -> Option<f64> {
    if let Some(client_name) = client {
        let client_metrics = run.client_metrics.get(client_name)?;
        return match metric_key {
            "error_rate" => Some(client_metrics.error_rate),
            "avg_latency_ms" => Some(client_metrics.latency.avg_ms),
            "p50_latency_ms" => client_metrics.latency.p50_ms,
            "p95_latency_ms" => client_metrics.latency.p95_ms,
            "p99_latency_ms" => client_metrics.latency.p99_ms,
            "throughput_rps" => client_metrics.latency.throughput_rps,
            _ => None,
        };
    }
    match metric_key {
        "error_rate" => Some(run.overall_error_rate),
        "avg_latency_ms" => Some(run.avg_latency_ms),
        "p50_latency_ms" => run.p50_latency_ms,
        "p95_latency_ms" => run.p95_latency_ms,
        "p99_latency_ms" => run.p99_latency_ms,
        "max_latency_ms" => run.max_latency_ms,
        _ => None,
    }
}

/// Degrading if the slope points the wrong way for the metric's direction
/// rule (latency/error-rate: up is worse; throughput: down is worse),
/// unless the fit is too weak (`strength < 0.3`), in which case it's
/// reported stable regardless of slope sign.
fn classify_direction(metric_key: &str, slope: f64, strength: f64) -> TrendDirection {
    if strength < STABILITY_THRESHOLD {
        return TrendDirection::Stable;
    }
    let worse_on_increase = !(metric_key.contains("throughput") || metric_key.ends_with("rps"));
    let degrading = if worse_on_increase { slope > 0.0 } else { slope < 0.0 };
    if degrading { TrendDirection::Degrading } else { TrendDirection::Improving }
}

fn build_trend_series(
    test_name: String,
    client: Option<String>,
    metric_key: String,
    points: Vec<TrendPoint>,
    forecast_horizon: Option<usize>,
) -> TrendSeries {
    if points.len() < MIN_POINTS_FOR_TREND.min(2) {
        return TrendSeries { test_name, client: client.unwrap_or_default(), metric_key, points, slope: 0.0, strength: 0.0, direction: TrendDirection::Stable, forecast: None };
    }

    let (slope, intercept, r) = linear_fit(&points);
    let strength = r.abs();
    let direction = classify_direction(&metric_key, slope, strength);

    let forecast = if points.len() >= MIN_POINTS_FOR_TREND {
        forecast_horizon.map(|horizon| intercept + slope * (points.len() as f64 - 1.0 + horizon as f64))
    } else {
        None
    };

    TrendSeries { test_name, client: client.unwrap_or_default(), metric_key, points, slope, strength, direction, forecast }
}

/// Ordinary least squares over `(index, value)` pairs; returns
/// `(slope, intercept, pearson_r)`.
fn linear_fit(points: &[TrendPoint]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let xs: Vec<f64> = (0..points.len()).map(|i| i as f64).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.value).collect();

    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..points.len() {
        let dx = xs[i] - x_mean;
        let dy = ys[i] - y_mean;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 {
        return (0.0, y_mean, 0.0);
    }

    let slope = cov / var_x;
    let intercept = y_mean - slope * x_mean;
    let r = if var_y == 0.0 { 0.0 } else { cov / (var_x.sqrt() * var_y.sqrt()) };
    (slope, intercept, r)
}

/// Percent change over the window; `None` when `first = 0`.
pub fn percent_change(points: &[TrendPoint]) -> Option<f64> {
    let first = points.first()?.value;
    let last = points.last()?.value;
    if first == 0.0 {
        return None;
    }
    Some((last - first) / first * 100.0)
}

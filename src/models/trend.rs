use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// One data point feeding a [`TrendSeries`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrendPoint {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Whether a metric is trending better, worse, or holding steady over the
/// analyzed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Degrading,
    Stable,
}

/// Linear-regression trend fit for one metric key of one client.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrendSeries {
    pub test_name: String,
    pub client: String,
    pub metric_key: String,
    pub points: Vec<TrendPoint>,
    /// Change per run, in the metric's native unit.
    pub slope: f64,
    /// `|r|`, the strength of the linear fit in `[0, 1]`.
    pub strength: f64,
    pub direction: TrendDirection,
    /// Projected value `horizon` runs past the last observed point, when
    /// at least [`MIN_POINTS_FOR_FORECAST`] points are available.
    pub forecast: Option<f64>,
}

/// Below this many points a linear fit is too noisy to report a slope at
/// all.
pub const MIN_POINTS_FOR_TREND: usize = 3;

/// A fit with `strength` under this is reported `Stable` regardless of
/// slope sign.
pub const STABILITY_THRESHOLD: f64 = 0.3;

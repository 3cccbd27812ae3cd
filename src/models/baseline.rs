use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::run::{PerClientMetrics, Run};
use std::collections::HashMap;

/// A frozen reference point that later runs are compared against.
///
/// The snapshot is copied out of the source [`Run`] at creation time so a
/// baseline survives the source run being deleted or re-tagged.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Baseline {
    pub id: i64,
    pub name: String,
    pub test_name: String,
    pub run_id: String,
    pub description: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub active: bool,
    pub snapshot: RunSnapshot,
}

/// The subset of a [`Run`] a baseline freezes in place.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunSnapshot {
    pub total_requests: i64,
    pub total_errors: i64,
    pub overall_error_rate: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub client_metrics: HashMap<String, PerClientMetrics>,
}

impl From<&Run> for RunSnapshot {
    fn from(run: &Run) -> Self {
        Self {
            total_requests: run.total_requests,
            total_errors: run.total_errors,
            overall_error_rate: run.overall_error_rate,
            avg_latency_ms: run.avg_latency_ms,
            p50_latency_ms: run.p50_latency_ms,
            p95_latency_ms: run.p95_latency_ms,
            p99_latency_ms: run.p99_latency_ms,
            max_latency_ms: run.max_latency_ms,
            client_metrics: run.client_metrics.clone(),
        }
    }
}

/// Request body for [`crate::services::BaselineManager::set_baseline`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetBaselineRequest {
    pub name: String,
    pub run_id: String,
    pub description: Option<String>,
    /// Demote the test's currently active baseline, if any.
    #[serde(default = "default_true")]
    pub activate: bool,
}

fn default_true() -> bool {
    true
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::threshold::{Severity, Threshold};

/// How the current run's metrics are compared against history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Compare against the immediately preceding run(s) for the same test.
    Sequential,
    /// Compare against the test's active (or named) baseline.
    Baseline,
    /// Compare against the mean of the last `window_size` previous runs.
    RollingAverage,
}

/// Options controlling a regression detection pass.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DetectionOptions {
    pub mode: ComparisonMode,
    /// Required when `mode = baseline`; `FailedPrecondition` otherwise.
    pub baseline_name: Option<String>,
    /// Sequential mode: average the first N previous runs instead of just one.
    #[serde(default = "default_lookback")]
    pub lookback_count: usize,
    /// Rolling-average mode: how many previous runs to average.
    #[serde(default = "default_window")]
    pub window_size: usize,
    #[serde(default)]
    pub enable_statistical: bool,
    #[serde(default)]
    pub custom_thresholds: HashMap<String, Threshold>,
    #[serde(default)]
    pub include_clients: Vec<String>,
    #[serde(default)]
    pub exclude_clients: Vec<String>,
    #[serde(default)]
    pub include_methods: Vec<String>,
    #[serde(default)]
    pub exclude_methods: Vec<String>,
    pub min_confidence: Option<f64>,
    #[serde(default)]
    pub ignore_improvements: bool,
}

fn default_lookback() -> usize {
    1
}

fn default_window() -> usize {
    5
}

/// A single metric that crossed a threshold.
/// Also used to carry improvements (same shape, opposite direction).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Regression {
    pub id: String,
    pub run_id: String,
    pub baseline_run_id: Option<String>,
    pub client: String,
    pub method: Option<String>,
    pub metric_key: String,
    pub baseline_value: f64,
    pub current_value: f64,
    pub absolute_change: f64,
    pub percent_change: f64,
    pub severity: Severity,
    pub is_significant: bool,
    pub p_value: Option<f64>,
    pub detected_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub notes: Option<String>,
}

/// Full output of a detection pass over one run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegressionReport {
    pub run_id: String,
    pub test_name: String,
    pub comparison_mode: ComparisonMode,
    pub compared_against: ComparedAgainst,
    pub generated_at: DateTime<Utc>,
    pub regressions: Vec<Regression>,
    pub improvements: Vec<Regression>,
    pub summary: RegressionSummary,
    pub client_analysis: Vec<ClientAnalysis>,
    pub method_analysis: Vec<MethodAnalysis>,
    pub risk_assessment: RiskAssessment,
    pub recommendations: Vec<String>,
    /// Per-client computation failures that were skipped rather than
    /// failing the whole call.
    pub warnings: Vec<String>,
}

/// What the run was actually compared to, recorded for auditability since
/// `RollingAverage` never names a single other run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub enum ComparedAgainst {
    Run(String),
    Runs(Vec<String>),
    Baseline { baseline_id: i64, run_id: String },
    RollingAverage { window: usize, run_ids: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Improved,
    Degraded,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringPriority {
    Routine,
    Elevated,
    Urgent,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Investigate,
    Monitor,
    None,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClientAnalysis {
    pub client: String,
    pub regression_count: usize,
    pub improvement_count: usize,
    pub health_score: i32,
    pub status: AnalysisStatus,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MethodAnalysis {
    pub client: String,
    pub method: String,
    pub regression_count: usize,
    pub improvement_count: usize,
    pub health_score: i32,
    pub status: AnalysisStatus,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub monitoring_priority: MonitoringPriority,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RegressionSummary {
    pub total: usize,
    pub minor: usize,
    pub major: usize,
    pub critical: usize,
    pub worst_severity: Option<Severity>,
    pub clients_affected: usize,
    pub methods_affected: usize,
    pub most_affected_client: Option<String>,
    pub most_affected_method: Option<String>,
    pub overall_health: i32,
    pub recommended_action: Option<RecommendedAction>,
}

/// Request body to acknowledge a regression finding.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AcknowledgeRegressionRequest {
    pub acknowledged_by: String,
    pub notes: Option<String>,
}

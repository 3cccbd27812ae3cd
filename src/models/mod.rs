pub mod analysis;
pub mod baseline;
pub mod regression;
pub mod run;
pub mod threshold;
pub mod trend;

pub use analysis::{analyze_run, RunAnalysis};
pub use baseline::{Baseline, RunSnapshot, SetBaselineRequest};
pub use regression::{
    AcknowledgeRegressionRequest, AnalysisStatus, ClientAnalysis, ComparedAgainst, ComparisonMode,
    DetectionOptions, MethodAnalysis, MonitoringPriority, Regression, RegressionReport,
    RegressionSummary, RecommendedAction, RiskAssessment, RiskLevel,
};
pub use run::{
    ConnectionMetrics, EnvironmentSnapshot, LatencySummary, MethodMatrixRow, MethodSummary,
    PerClientMetrics, Run, RunFilter, RunSummary,
};
pub use threshold::{get_severity, Direction, Severity, Threshold, ThresholdTable};
pub use trend::{TrendDirection, TrendPoint, TrendSeries, MIN_POINTS_FOR_TREND, STABILITY_THRESHOLD};

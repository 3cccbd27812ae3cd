//! H4: the regression detector. Entry point is
//! [`RegressionDetector::detect_regressions`], an eight-step pipeline from
//! loading the run through persisting detected regressions. Built on the
//! service-struct-over-a-pool shape used throughout this crate's other
//! services, generalized with a sibling-task fan-out for per-client
//! comparison.

pub mod modes;
pub mod report;
pub mod severity;
pub mod statistics;
pub mod thresholds;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::models::{
    ComparedAgainst, ComparisonMode, DetectionOptions, PerClientMetrics, Regression, RegressionReport, Run, Threshold,
};
use crate::services::baseline_manager::BaselineManager;
use crate::services::historic_store::HistoricStore;
use crate::utils::{ApiError, ApiResult};

use modes::{aggregate_runs, AggregateBasis};
use statistics::SampleStats;
use thresholds::SharedThresholds;

pub struct RegressionDetector {
    store: Arc<HistoricStore>,
    baseline_manager: Arc<BaselineManager>,
    thresholds: SharedThresholds,
}

/// Namespace for deriving deterministic regression ids via UUIDv5.
const REGRESSION_ID_NAMESPACE: uuid::Uuid = uuid::Uuid::from_bytes([
    0xa6, 0x1f, 0x6b, 0x9e, 0x3d, 0x5c, 0x4b, 0x0e, 0x9a, 0x2a, 0x7e, 0x1d, 0x4c, 0x8b, 0x5f, 0x02,
]);

/// A regression for the same `(run, client, method, metric)` must resolve
/// to the same id across detection passes so `save_regressions`'s
/// upsert-by-id re-detection actually updates the existing row in place
/// instead of inserting a duplicate.
fn regression_id(run_id: &str, client: &str, method: Option<&str>, metric_key: &str) -> String {
    let key = format!("{run_id}\u{0}{client}\u{0}{}\u{0}{metric_key}", method.unwrap_or(""));
    uuid::Uuid::new_v5(&REGRESSION_ID_NAMESPACE, key.as_bytes()).to_string()
}

/// A single metric comparison basis, independent of which mode produced
/// it, so the same pairwise-compare pipeline runs for all three modes.
struct Basis {
    compared_against: ComparedAgainst,
    baseline_run_id: Option<String>,
    overall_error_rate: f64,
    avg_latency_ms: f64,
    p50_latency_ms: Option<f64>,
    p95_latency_ms: Option<f64>,
    p99_latency_ms: Option<f64>,
    max_latency_ms: Option<f64>,
    client_metrics: HashMap<String, PerClientMetrics>,
    /// `None` when the basis isn't a single persisted run (baseline and
    /// rolling-average/multi-run sequential bases have no sample-count
    /// history to draw on, so statistical gating falls back to the
    /// major-threshold rule for them).
    sample_stats: Option<HashMap<String, SampleStats>>,
}

impl RegressionDetector {
    pub fn new(store: Arc<HistoricStore>, baseline_manager: Arc<BaselineManager>, thresholds: SharedThresholds) -> Self {
        Self { store, baseline_manager, thresholds }
    }

    pub async fn get_thresholds(&self) -> crate::models::ThresholdTable {
        self.thresholds.get_all().await
    }

    pub async fn set_threshold(&self, threshold: Threshold) {
        self.thresholds.set(threshold).await;
    }

    /// Runs the full eight-step detection pipeline for one run.
    pub async fn detect_regressions(&self, run_id: &str, options: DetectionOptions) -> ApiResult<RegressionReport> {
        validate_options(&options)?;

        // Step 1: load run.
        let run = self.store.get_run(run_id).await?;

        // Step 2: resolve comparison basis per mode.
        let mut warnings = Vec::new();
        let basis = self.resolve_basis(&run, &options, &mut warnings).await?;

        let Some(basis) = basis else {
            // No prior history to compare against (e.g. first run of a
            // test): an empty, clean report rather than an error.
            return Ok(empty_report(&run, options.mode, &warnings));
        };

        // Step 3-5: pairwise compare at run/client/client+method granularity,
        // with optional statistical gating and include/exclude filtering.
        let all = self.compare_all(&run, &basis, &options).await?;

        // Step 6: split into regressions vs improvements.
        let mut regressions: Vec<Regression> = Vec::new();
        let mut improvements: Vec<Regression> = Vec::new();
        for candidate in all {
            if is_improvement(&candidate) {
                improvements.push(candidate);
            } else {
                regressions.push(candidate);
            }
        }
        // `ignore_improvements` only suppresses improvements from the
        // output; the internal counts used by the summary still see them
        //.
        let improvements_out = if options.ignore_improvements { Vec::new() } else { improvements.clone() };

        // Step 7: assemble report.
        let clients: Vec<String> = run.client_metrics.keys().cloned().collect();
        let client_analysis = report::client_analysis(&regressions, &improvements, &clients);
        let method_analysis = report::method_analysis(&regressions, &improvements);
        let summary = report::summary(&regressions, &improvements, &clients);
        let risk_assessment = report::risk_assessment(&summary);
        let recommendations = report::recommendations(&summary, &regressions);

        let detected_report = RegressionReport {
            run_id: run.id.clone(),
            test_name: run.test_name.clone(),
            comparison_mode: options.mode,
            compared_against: basis.compared_against,
            generated_at: Utc::now(),
            regressions: regressions.clone(),
            improvements: improvements_out,
            summary,
            client_analysis,
            method_analysis,
            risk_assessment,
            recommendations,
            warnings,
        };

        // Step 8: persist regressions (not the report itself).
        self.store.save_regressions(&regressions).await?;

        Ok(detected_report)
    }

    async fn resolve_basis(&self, run: &Run, options: &DetectionOptions, warnings: &mut Vec<String>) -> ApiResult<Option<Basis>> {
        match options.mode {
            ComparisonMode::Sequential => {
                let prior = self
                    .store
                    .list_runs(&crate::models::RunFilter {
                        test_name: Some(run.test_name.clone()),
                        to: Some(run.timestamp),
                        limit: Some((options.lookback_count.max(1) + 5) as i64),
                        ..Default::default()
                    })
                    .await?;
                let prior: Vec<Run> = prior.into_iter().filter(|r| r.id != run.id).take(options.lookback_count.max(1)).collect();
                if prior.is_empty() {
                    return Ok(None);
                }
                if prior.len() == 1 {
                    Ok(Some(basis_from_run(&prior[0])))
                } else {
                    let run_ids: Vec<String> = prior.iter().map(|r| r.id.clone()).collect();
                    Ok(Some(basis_from_aggregate(aggregate_runs(&prior), ComparedAgainst::Runs(run_ids))))
                }
            },
            ComparisonMode::Baseline => {
                let name = options
                    .baseline_name
                    .as_ref()
                    .ok_or_else(|| ApiError::failed_precondition("baseline_name is required for baseline comparison mode"))?;
                let baseline = match self.baseline_manager.get_baseline(name).await {
                    Ok(b) => b,
                    Err(ApiError::NotFound(_)) => {
                        return Err(ApiError::failed_precondition(format!("baseline {name} does not exist")));
                    },
                    Err(other) => return Err(other),
                };
                Ok(Some(Basis {
                    compared_against: ComparedAgainst::Baseline { baseline_id: baseline.id, run_id: baseline.run_id.clone() },
                    baseline_run_id: Some(baseline.run_id.clone()),
                    overall_error_rate: baseline.snapshot.overall_error_rate,
                    avg_latency_ms: baseline.snapshot.avg_latency_ms,
                    p50_latency_ms: baseline.snapshot.p50_latency_ms,
                    p95_latency_ms: baseline.snapshot.p95_latency_ms,
                    p99_latency_ms: baseline.snapshot.p99_latency_ms,
                    max_latency_ms: baseline.snapshot.max_latency_ms,
                    client_metrics: baseline.snapshot.client_metrics.clone(),
                    sample_stats: None,
                }))
            },
            ComparisonMode::RollingAverage => {
                let prior = self
                    .store
                    .list_runs(&crate::models::RunFilter {
                        test_name: Some(run.test_name.clone()),
                        to: Some(run.timestamp),
                        limit: Some((options.window_size.max(1) + 5) as i64),
                        ..Default::default()
                    })
                    .await?;
                let prior: Vec<Run> = prior.into_iter().filter(|r| r.id != run.id).take(options.window_size.max(1)).collect();
                if prior.is_empty() {
                    return Ok(None);
                }
                if prior.len() < options.window_size {
                    warnings.push(format!(
                        "rolling_average: only {} of {} requested prior runs were available",
                        prior.len(),
                        options.window_size
                    ));
                }
                let window = prior.len();
                let run_ids: Vec<String> = prior.iter().map(|r| r.id.clone()).collect();
                Ok(Some(basis_from_aggregate(aggregate_runs(&prior), ComparedAgainst::RollingAverage { window, run_ids })))
            },
        }
    }

    async fn compare_all(&self, run: &Run, basis: &Basis, options: &DetectionOptions) -> ApiResult<Vec<Regression>> {
        let mut out = Vec::new();

        // Run-level granularity.
        out.extend(self.compare_metrics(run.id.clone(), "*".to_string(), None, basis, &[
            ("overall_error_rate", Some(basis.overall_error_rate), Some(run.overall_error_rate)),
            ("avg_latency_ms", Some(basis.avg_latency_ms), Some(run.avg_latency_ms)),
            ("p50_latency_ms", basis.p50_latency_ms, run.p50_latency_ms),
            ("p95_latency_ms", basis.p95_latency_ms, run.p95_latency_ms),
            ("p99_latency_ms", basis.p99_latency_ms, run.p99_latency_ms),
            ("max_latency_ms", basis.max_latency_ms, run.max_latency_ms),
        ], options).await?;

        // Client and client+method granularity, one join-set task per
        // client so a slow per-client comparison never blocks siblings
        //.
        let mut set = tokio::task::JoinSet::new();
        for (client_name, current) in run.client_metrics.clone() {
            if !client_included(&client_name, &options.include_clients, &options.exclude_clients) {
                continue;
            }
            let Some(baseline_client) = basis.client_metrics.get(&client_name).cloned() else {
                continue;
            };
            let run_id = run.id.clone();
            let include_methods = options.include_methods.clone();
            let exclude_methods = options.exclude_methods.clone();
            let sample_stats = basis.sample_stats.clone();
            let thresholds = self.thresholds.clone();
            let enable_statistical = options.enable_statistical;
            let min_confidence = options.min_confidence;
            let custom_thresholds = options.custom_thresholds.clone();

            set.spawn(async move {
                compare_client(
                    run_id,
                    client_name,
                    current,
                    baseline_client,
                    sample_stats,
                    thresholds,
                    enable_statistical,
                    min_confidence,
                    &custom_thresholds,
                    &include_methods,
                    &exclude_methods,
                )
                .await
            });
        }

        let mut warnings = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(regressions)) => out.extend(regressions),
                Ok(Err(err)) => warnings.push(err.to_string()),
                Err(join_err) => warnings.push(format!("per-client comparison task panicked: {join_err}")),
            }
        }
        // Per-client failures never fail the whole detection call; they're
        // folded into the caller's warnings by `detect_regressions` via the
        // returned report.
        for w in warnings {
            tracing::warn!(warning = %w, "per-client regression comparison failed");
        }

        Ok(out)
    }

    async fn compare_metrics(
        &self,
        run_id: String,
        client: String,
        method: Option<String>,
        basis: &Basis,
        metrics: &[(&str, Option<f64>, Option<f64>)],
        options: &DetectionOptions,
    ) -> ApiResult<Vec<Regression>> {
        let mut out = compare_metric_set(
            &run_id,
            &client,
            method,
            metrics,
            &self.thresholds,
            options.enable_statistical,
            options.min_confidence,
            &options.custom_thresholds,
            basis.sample_stats.as_ref(),
        )
        .await?;
        for r in &mut out {
            r.baseline_run_id = basis.baseline_run_id.clone();
        }
        Ok(out)
    }
}

#[allow(clippy::too_many_arguments)]
async fn compare_client(
    run_id: String,
    client_name: String,
    current: PerClientMetrics,
    baseline: PerClientMetrics,
    sample_stats: Option<HashMap<String, SampleStats>>,
    thresholds: SharedThresholds,
    enable_statistical: bool,
    min_confidence: Option<f64>,
    custom_thresholds: &HashMap<String, Threshold>,
    include_methods: &[String],
    exclude_methods: &[String],
) -> ApiResult<Vec<Regression>> {
    let mut out = Vec::new();

    let client_metrics: Vec<(&str, Option<f64>, Option<f64>)> = vec![
        ("error_rate", Some(baseline.error_rate), Some(current.error_rate)),
        ("avg_latency_ms", Some(baseline.latency.avg_ms), Some(current.latency.avg_ms)),
        ("p95_latency_ms", baseline.latency.p95_ms, current.latency.p95_ms),
        ("p99_latency_ms", baseline.latency.p99_ms, current.latency.p99_ms),
        ("throughput_rps", baseline.latency.throughput_rps, current.latency.throughput_rps),
    ];
    out.extend(
        compare_metric_set(&run_id, &client_name, None, &client_metrics, &thresholds, enable_statistical, min_confidence, custom_thresholds, sample_stats.as_ref())
            .await?,
    );

    for (method_name, current_method) in &current.methods {
        if !client_included(method_name, include_methods, exclude_methods) {
            continue;
        }
        let Some(baseline_method) = baseline.methods.get(method_name) else {
            continue;
        };
        let method_metrics: Vec<(&str, Option<f64>, Option<f64>)> = vec![
            ("avg_latency_ms", Some(baseline_method.avg_ms), Some(current_method.avg_ms)),
            ("p95_latency_ms", baseline_method.p95_ms, current_method.p95_ms),
            ("p99_latency_ms", baseline_method.p99_ms, current_method.p99_ms),
            ("throughput_rps", baseline_method.throughput_rps, current_method.throughput_rps),
        ];
        out.extend(
            compare_metric_set(
                &run_id,
                &client_name,
                Some(method_name.clone()),
                &method_metrics,
                &thresholds,
                enable_statistical,
                min_confidence,
                custom_thresholds,
                sample_stats.as_ref(),
            )
            .await?,
        );
    }

    Ok(out)
}

#[allow(clippy::too_many_arguments)]
async fn compare_metric_set(
    run_id: &str,
    client: &str,
    method: Option<String>,
    metrics: &[(&str, Option<f64>, Option<f64>)],
    thresholds: &SharedThresholds,
    enable_statistical: bool,
    min_confidence: Option<f64>,
    custom_thresholds: &HashMap<String, Threshold>,
    sample_stats: Option<&HashMap<String, SampleStats>>,
) -> ApiResult<Vec<Regression>> {
    let mut out = Vec::new();
    for (metric_key, baseline_value, current_value) in metrics {
        let (Some(baseline_value), Some(current_value)) = (*baseline_value, *current_value) else {
            continue;
        };
        if baseline_value == 0.0 {
            continue;
        }
        let threshold = if let Some(custom) = custom_thresholds.get(*metric_key) { custom.clone() } else { thresholds.resolve(metric_key).await };

        let absolute_change = current_value - baseline_value;
        let percent_change = absolute_change / baseline_value * 100.0;

        // `error_rate`/`overall_error_rate` are stored as [0,1] fractions,
        // but `is_percentage_point` thresholds are expressed in percentage
        // points (1/5/10, not 0.01/0.05/0.1) — scale before classifying.
        let severity_magnitude = if threshold.is_percentage_point { absolute_change * 100.0 } else { absolute_change };
        let Some(classified) = severity::get_severity(&threshold, severity_magnitude, percent_change) else {
            continue;
        };

        let (is_significant, p_value) = if enable_statistical {
            match sample_stats.and_then(|m| m.get(*metric_key)) {
                Some(baseline_stats) => {
                    let current_stats = SampleStats { mean: current_value, std_dev: 0.0, count: 1 };
                    match statistics::welch_test(*baseline_stats, current_stats, threshold.significance_level) {
                        Some(result) => {
                            let confident = min_confidence.map(|c| 1.0 - result.p_value >= c).unwrap_or(true);
                            (confident, Some(result.p_value))
                        },
                        None => (true, None),
                    }
                },
                None => (true, None),
            }
        } else {
            (true, None)
        };

        if !is_significant {
            continue;
        }

        out.push(Regression {
            id: regression_id(run_id, client, method.as_deref(), metric_key),
            run_id: run_id.to_string(),
            baseline_run_id: None,
            client: client.to_string(),
            method: method.clone(),
            metric_key: metric_key.to_string(),
            baseline_value,
            current_value,
            absolute_change,
            percent_change,
            severity: classified,
            is_significant: p_value.is_some(),
            p_value,
            detected_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            notes: None,
        });
    }
    Ok(out)
}

fn client_included(name: &str, include: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|e| e == name) {
        return false;
    }
    if include.is_empty() {
        return true;
    }
    include.iter().any(|i| i == name)
}

/// Symmetric rule: a candidate with a threshold-crossing magnitude in the
/// "good" direction for its metric is an improvement.
fn is_improvement(candidate: &Regression) -> bool {
    let improves_on_decrease = candidate.metric_key.contains("latency") || candidate.metric_key.contains("error");
    let improves_on_increase = candidate.metric_key.contains("throughput") || candidate.metric_key.ends_with("rps");
    if improves_on_decrease {
        candidate.absolute_change < 0.0
    } else if improves_on_increase {
        candidate.absolute_change > 0.0
    } else {
        false
    }
}

fn basis_from_run(run: &Run) -> Basis {
    Basis {
        compared_against: ComparedAgainst::Run(run.id.clone()),
        baseline_run_id: Some(run.id.clone()),
        overall_error_rate: run.overall_error_rate,
        avg_latency_ms: run.avg_latency_ms,
        p50_latency_ms: run.p50_latency_ms,
        p95_latency_ms: run.p95_latency_ms,
        p99_latency_ms: run.p99_latency_ms,
        max_latency_ms: run.max_latency_ms,
        client_metrics: run.client_metrics.clone(),
        sample_stats: None,
    }
}

fn basis_from_aggregate(aggregate: AggregateBasis, compared_against: ComparedAgainst) -> Basis {
    Basis {
        compared_against,
        baseline_run_id: aggregate.source_run_ids.last().cloned(),
        overall_error_rate: aggregate.overall_error_rate,
        avg_latency_ms: aggregate.avg_latency_ms,
        p50_latency_ms: aggregate.p50_latency_ms,
        p95_latency_ms: aggregate.p95_latency_ms,
        p99_latency_ms: aggregate.p99_latency_ms,
        max_latency_ms: aggregate.max_latency_ms,
        client_metrics: aggregate.client_metrics,
        sample_stats: None,
    }
}

fn empty_report(run: &Run, mode: ComparisonMode, warnings: &[String]) -> RegressionReport {
    let summary = report::summary(&[], &[], &[]);
    let risk_assessment = report::risk_assessment(&summary);
    RegressionReport {
        run_id: run.id.clone(),
        test_name: run.test_name.clone(),
        comparison_mode: mode,
        compared_against: ComparedAgainst::Runs(vec![]),
        generated_at: Utc::now(),
        regressions: vec![],
        improvements: vec![],
        summary,
        client_analysis: vec![],
        method_analysis: vec![],
        risk_assessment,
        recommendations: vec!["No prior runs available for comparison.".to_string()],
        warnings: warnings.to_vec(),
    }
}

fn validate_options(options: &DetectionOptions) -> ApiResult<()> {
    if options.mode == ComparisonMode::Baseline && options.baseline_name.is_none() {
        return Err(ApiError::invalid_input("baseline_name is required when mode = baseline"));
    }
    if options.lookback_count == 0 {
        return Err(ApiError::invalid_input("lookback_count must be at least 1"));
    }
    if options.window_size == 0 {
        return Err(ApiError::invalid_input("window_size must be at least 1"));
    }
    if let Some(min_confidence) = options.min_confidence {
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(ApiError::invalid_input("min_confidence must be within [0, 1]"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunFilter;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashMap as Map;
    use std::path::PathBuf;

    async fn setup() -> (Arc<HistoricStore>, Arc<BaselineManager>, RegressionDetector) {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let store = Arc::new(HistoricStore::new(pool.clone(), PathBuf::from("/tmp/bhd-test"), false));
        let baselines = Arc::new(BaselineManager::new(pool, store.clone()));
        let detector = RegressionDetector::new(store.clone(), baselines.clone(), SharedThresholds::default());
        (store, baselines, detector)
    }

    fn sample_run(id: &str, avg_latency_ms: f64) -> Run {
        Run {
            id: id.to_string(),
            test_name: "T".to_string(),
            timestamp: Utc::now(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration_secs: 1.0,
            git_commit: None,
            git_branch: None,
            tags: vec![],
            target_rps: None,
            client_list: vec![],
            method_list: vec![],
            total_requests: 1000,
            total_errors: 10,
            overall_error_rate: 0.01,
            avg_latency_ms,
            min_latency_ms: Some(10.0),
            p50_latency_ms: Some(avg_latency_ms * 0.8),
            p95_latency_ms: Some(avg_latency_ms * 2.0),
            p99_latency_ms: Some(avg_latency_ms * 3.0),
            max_latency_ms: Some(avg_latency_ms * 4.0),
            client_metrics: Map::new(),
            environment: None,
            is_baseline: false,
            notes: None,
            artifact_path: None,
        }
    }

    fn sequential_options() -> DetectionOptions {
        DetectionOptions {
            mode: ComparisonMode::Sequential,
            baseline_name: None,
            lookback_count: 1,
            window_size: 5,
            enable_statistical: false,
            custom_thresholds: Map::new(),
            include_clients: vec![],
            exclude_clients: vec![],
            include_methods: vec![],
            exclude_methods: vec![],
            min_confidence: None,
            ignore_improvements: false,
        }
    }

    #[tokio::test]
    async fn baseline_regression_avg_latency_150_to_225_is_critical() {
        let (store, baselines, detector) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();
        baselines.set_baseline("r1", "b1", None, true).await.unwrap();
        store.ingest_run(sample_run("r2", 225.0)).await.unwrap();

        let options = DetectionOptions { mode: ComparisonMode::Baseline, baseline_name: Some("b1".to_string()), ..sequential_options() };
        let report = detector.detect_regressions("r2", options).await.unwrap();

        let latency_regression = report.regressions.iter().find(|r| r.metric_key == "avg_latency_ms" && r.client == "*").unwrap();
        assert_eq!(latency_regression.percent_change, 50.0);
        assert_eq!(latency_regression.severity, crate::models::Severity::Critical);
    }

    #[tokio::test]
    async fn sequential_stable_run_yields_zero_regressions_and_full_health() {
        let (store, _baselines, detector) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();
        store.ingest_run(sample_run("r2", 150.0)).await.unwrap();

        let report = detector.detect_regressions("r2", sequential_options()).await.unwrap();
        assert!(report.regressions.is_empty());
        assert_eq!(report.summary.overall_health, 100);
    }

    #[tokio::test]
    async fn rolling_average_mode_flags_regression_against_window_mean() {
        let (store, _baselines, detector) = setup().await;
        for (id, latency) in [("r1", 100.0), ("r2", 110.0), ("r3", 90.0), ("r4", 105.0), ("r5", 95.0)] {
            store.ingest_run(sample_run(id, latency)).await.unwrap();
        }
        store.ingest_run(sample_run("r6", 130.0)).await.unwrap();

        let options = DetectionOptions { mode: ComparisonMode::RollingAverage, window_size: 5, ..sequential_options() };
        let report = detector.detect_regressions("r6", options).await.unwrap();

        let latency_regression = report.regressions.iter().find(|r| r.metric_key == "avg_latency_ms" && r.client == "*").unwrap();
        assert_eq!(latency_regression.percent_change, 30.0);
    }

    #[tokio::test]
    async fn fresh_ingest_with_no_history_yields_empty_report() {
        let (store, _baselines, detector) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();

        let report = detector.detect_regressions("r1", sequential_options()).await.unwrap();
        assert!(report.regressions.is_empty());
        assert!(report.improvements.is_empty());
    }

    #[tokio::test]
    async fn acknowledge_then_redetect_does_not_clear_acknowledgement() {
        let (store, baselines, detector) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();
        baselines.set_baseline("r1", "b1", None, true).await.unwrap();
        store.ingest_run(sample_run("r2", 225.0)).await.unwrap();

        let options = DetectionOptions { mode: ComparisonMode::Baseline, baseline_name: Some("b1".to_string()), ..sequential_options() };
        detector.detect_regressions("r2", options.clone()).await.unwrap();

        let regressions = store.list_regressions(Some("r2")).await.unwrap();
        let count_before = regressions.len();
        let id = regressions[0].id.clone();
        store.acknowledge_regression(&id, "alice", None).await.unwrap();

        detector.detect_regressions("r2", options).await.unwrap();
        let regressions = store.list_regressions(Some("r2")).await.unwrap();
        // Re-detection must upsert in place, not insert a second row for the
        // same (run, client, method, metric).
        assert_eq!(regressions.len(), count_before);
        let reacknowledged = regressions.iter().find(|r| r.id == id).unwrap();
        assert!(reacknowledged.acknowledged_at.is_some());
    }

    #[tokio::test]
    async fn regression_id_is_deterministic_across_detection_passes() {
        let (store, baselines, detector) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();
        baselines.set_baseline("r1", "b1", None, true).await.unwrap();
        store.ingest_run(sample_run("r2", 225.0)).await.unwrap();

        let options = DetectionOptions { mode: ComparisonMode::Baseline, baseline_name: Some("b1".to_string()), ..sequential_options() };
        let first = detector.detect_regressions("r2", options.clone()).await.unwrap();
        let second = detector.detect_regressions("r2", options).await.unwrap();

        let first_id = first.regressions.iter().find(|r| r.metric_key == "avg_latency_ms" && r.client == "*").unwrap().id.clone();
        let second_id = second.regressions.iter().find(|r| r.metric_key == "avg_latency_ms" && r.client == "*").unwrap().id.clone();
        assert_eq!(first_id, second_id);
    }

    #[tokio::test]
    async fn error_rate_regression_is_flagged_in_percentage_points() {
        let (store, baselines, detector) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();
        baselines.set_baseline("r1", "b1", None, true).await.unwrap();

        let mut r2 = sample_run("r2", 150.0);
        r2.total_errors = 100;
        r2.overall_error_rate = 0.10;
        store.ingest_run(r2).await.unwrap();

        let options = DetectionOptions { mode: ComparisonMode::Baseline, baseline_name: Some("b1".to_string()), ..sequential_options() };
        let report = detector.detect_regressions("r2", options).await.unwrap();

        // 1% -> 10% is +9 percentage points: above the major threshold (5)
        // but below critical (10). A magnitude/100 bug would see 0.09 and
        // never fire at all.
        let error_rate_regression = report.regressions.iter().find(|r| r.metric_key == "overall_error_rate" && r.client == "*").unwrap();
        assert_eq!(error_rate_regression.severity, crate::models::Severity::Major);
    }

    #[tokio::test]
    async fn baseline_mode_without_baseline_name_is_invalid_input() {
        let (store, _baselines, detector) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();
        let options = DetectionOptions { mode: ComparisonMode::Baseline, baseline_name: None, ..sequential_options() };
        let err = detector.detect_regressions("r1", options).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unknown_baseline_name_is_failed_precondition() {
        let (store, _baselines, detector) = setup().await;
        store.ingest_run(sample_run("r1", 150.0)).await.unwrap();
        let options = DetectionOptions { mode: ComparisonMode::Baseline, baseline_name: Some("missing".to_string()), ..sequential_options() };
        let err = detector.detect_regressions("r1", options).await.unwrap_err();
        assert!(matches!(err, ApiError::FailedPrecondition(_)));
    }

    #[test]
    fn run_filter_default_has_no_bounds() {
        let filter = RunFilter::default();
        assert!(filter.test_name.is_none());
    }
}

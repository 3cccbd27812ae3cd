use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware as axum_middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use bench_historian::config::Config;
use bench_historian::db;
use bench_historian::models;
use bench_historian::services::{BaselineManager, HistoricStore, PushChannel, RegressionDetector, SharedThresholds, TrendAnalyzer};
use bench_historian::utils::ScheduledExecutor;
use bench_historian::{handlers, middleware, AppState};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,

        handlers::runs::list_runs,
        handlers::runs::ingest_run,
        handlers::runs::get_run,
        handlers::runs::delete_run,
        handlers::runs::run_methods,
        handlers::runs::compare_runs,
        handlers::runs::analyze,
        handlers::runs::test_summary,

        handlers::baselines::list_baselines,
        handlers::baselines::set_baseline,
        handlers::baselines::get_baseline,
        handlers::baselines::delete_baseline,
        handlers::baselines::compare_to_baseline,

        handlers::regressions::detect,
        handlers::regressions::list_regressions,
        handlers::regressions::acknowledge,
        handlers::regressions::get_thresholds,
        handlers::regressions::set_threshold,

        handlers::trends::test_trends,

        handlers::simplejson::search,
        handlers::simplejson::query,
        handlers::simplejson::tag_keys,
        handlers::simplejson::tag_values,

        handlers::ws::ws_handler,
    ),
    components(
        schemas(
            models::Run,
            models::RunSummary,
            models::RunFilter,
            models::PerClientMetrics,
            models::LatencySummary,
            models::ConnectionMetrics,
            models::MethodSummary,
            models::MethodMatrixRow,
            models::EnvironmentSnapshot,
            models::RunAnalysis,
            models::Baseline,
            models::SetBaselineRequest,
            models::RunSnapshot,
            models::Regression,
            models::RegressionReport,
            models::DetectionOptions,
            models::ComparisonMode,
            models::ComparedAgainst,
            models::AnalysisStatus,
            models::RiskLevel,
            models::MonitoringPriority,
            models::RecommendedAction,
            models::ClientAnalysis,
            models::MethodAnalysis,
            models::RiskAssessment,
            models::RegressionSummary,
            models::AcknowledgeRegressionRequest,
            models::Threshold,
            models::ThresholdTable,
            models::Severity,
            models::Direction,
            models::TrendSeries,
            models::TrendPoint,
            models::TrendDirection,
            bench_historian::services::Comparison,
            bench_historian::services::MetricDelta,
            bench_historian::services::DeltaClassification,
            handlers::health::HealthResponse,
            handlers::simplejson::TimeseriesResponse,
            handlers::simplejson::TagKey,
            handlers::simplejson::TagValue,
        )
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Runs", description = "Benchmark run ingestion and lookup (H1)"),
        (name = "Baselines", description = "Named comparison snapshots (H2)"),
        (name = "Regressions", description = "Regression detection and acknowledgement (H4)"),
        (name = "Trends", description = "Multi-run trend series (H3)"),
        (name = "SimpleJSON", description = "Grafana SimpleJSON datasource surface (H5)"),
        (name = "Push", description = "WebSocket push channel (H5)"),
    )
)]
struct ApiDoc;

/// Background task wiring retention cleanup into `ScheduledExecutor`.
struct RetentionCleanup {
    store: Arc<HistoricStore>,
    retention_days: i64,
}

impl bench_historian::utils::ScheduledTask for RetentionCleanup {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            let deleted = self.store.cleanup(self.retention_days).await?;
            if deleted > 0 {
                tracing::info!(deleted, "retention cleanup removed expired runs");
            }
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match run().await {
        Ok(()) => std::process::ExitCode::from(0),
        Err(err) => {
            tracing::error!("fatal: {err}");
            match err.downcast_ref::<ConfigError>() {
                Some(_) => std::process::ExitCode::from(2),
                None => match err.downcast_ref::<sqlx::Error>() {
                    Some(_) => std::process::ExitCode::from(3),
                    None => std::process::ExitCode::from(1),
                },
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {0}")]
struct ConfigError(String);

async fn run() -> anyhow::Result<()> {
    let config = Config::load().map_err(|e| ConfigError(e.to_string()))?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("bench-historian.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
        registry.with(tracing_subscriber::fmt::layer().with_writer(non_blocking)).with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("bench-historian starting up");

    let pool = db::create_pool(&config.database.url, config.database.max_open_conns).await?;
    tracing::info!("database pool created");

    let historic_store = Arc::new(HistoricStore::new(pool.clone(), std::path::PathBuf::from(&config.historic.historic_path), config.historic.enabled));
    let baseline_manager = Arc::new(BaselineManager::new(pool.clone(), Arc::clone(&historic_store)));
    let trend_analyzer = Arc::new(TrendAnalyzer::new(Arc::clone(&historic_store)));
    let thresholds = SharedThresholds::default();
    let regression_detector = Arc::new(RegressionDetector::new(Arc::clone(&historic_store), Arc::clone(&baseline_manager), thresholds));
    let push_channel = Arc::new(PushChannel::new(config.push_channel.queue_capacity));

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        config: Arc::new(config.clone()),
        historic_store: Arc::clone(&historic_store),
        baseline_manager: Arc::clone(&baseline_manager),
        trend_analyzer: Arc::clone(&trend_analyzer),
        regression_detector: Arc::clone(&regression_detector),
        push_channel: Arc::clone(&push_channel),
    });

    if config.historic.enabled {
        let interval = Duration::from_secs(24 * 60 * 60);
        tracing::info!(retention_days = config.historic.retention_days, "starting retention cleanup task");
        let executor = ScheduledExecutor::new("retention-cleanup", interval);
        let task = RetentionCleanup { store: Arc::clone(&historic_store), retention_days: config.historic.retention_days };
        tokio::spawn(async move {
            executor.start(task).await;
        });
    }

    let run_routes = Router::new()
        .route("/api/runs", get(handlers::runs::list_runs).post(handlers::runs::ingest_run))
        .route("/api/runs/:id", get(handlers::runs::get_run).delete(handlers::runs::delete_run))
        .route("/api/runs/:id/methods", get(handlers::runs::run_methods))
        .route("/api/runs/:id/compare/:other_id", get(handlers::runs::compare_runs))
        .route("/api/runs/:id/analyze", post(handlers::runs::analyze))
        .route("/api/tests/:name/summary", get(handlers::runs::test_summary))
        .route("/api/tests/:name/trends", get(handlers::trends::test_trends));

    let baseline_routes = Router::new()
        .route("/api/baselines", get(handlers::baselines::list_baselines).post(handlers::baselines::set_baseline))
        .route("/api/baselines/:name", get(handlers::baselines::get_baseline).delete(handlers::baselines::delete_baseline))
        .route("/api/baselines/:name/compare/:run_id", get(handlers::baselines::compare_to_baseline));

    let regression_routes = Router::new()
        .route("/api/regressions/detect/:run_id", post(handlers::regressions::detect))
        .route("/api/regressions", get(handlers::regressions::list_regressions))
        .route("/api/regressions/:id/ack", post(handlers::regressions::acknowledge))
        .route("/api/regressions/thresholds", get(handlers::regressions::get_thresholds).put(handlers::regressions::set_threshold));

    let simplejson_routes = Router::new()
        .route("/grafana/search", post(handlers::simplejson::search))
        .route("/grafana/query", post(handlers::simplejson::query))
        .route("/grafana/tag-keys", post(handlers::simplejson::tag_keys))
        .route("/grafana/tag-values", post(handlers::simplejson::tag_values));

    let ws_routes = Router::new().route("/api/ws", get(handlers::ws::ws_handler));
    let health_routes = Router::new().route("/health", get(handlers::health::health_check));

    let request_deadline = Duration::from_secs(config.server.request_deadline_secs);

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(run_routes)
        .merge(baseline_routes)
        .merge(regression_routes)
        .merge(simplejson_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .with_state(app_state)
        .layer(axum_middleware::from_fn(move |req, next| middleware::request_context(request_deadline, req, next)))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("server listening on http://{addr}");
    tracing::info!("API documentation available at http://{addr}/api-docs");

    axum::serve(listener, app).await?;

    Ok(())
}

//! In-memory SQLite harness for integration tests.

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::services::{BaselineManager, HistoricStore, PushChannel, RegressionDetector, SharedThresholds, TrendAnalyzer};

pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect("sqlite::memory:")
        .await
        .expect("failed to create in-memory test database");

    sqlx::migrate!("./migrations").run(&pool).await.expect("failed to run migrations");

    pool
}

pub struct TestServices {
    pub historic_store: Arc<HistoricStore>,
    pub baseline_manager: Arc<BaselineManager>,
    pub trend_analyzer: Arc<TrendAnalyzer>,
    pub regression_detector: Arc<RegressionDetector>,
    pub push_channel: Arc<PushChannel>,
}

pub async fn create_test_services() -> TestServices {
    let pool = create_test_db().await;
    let historic_store = Arc::new(HistoricStore::new(pool.clone(), std::env::temp_dir(), false));
    let baseline_manager = Arc::new(BaselineManager::new(pool.clone(), Arc::clone(&historic_store)));
    let trend_analyzer = Arc::new(TrendAnalyzer::new(Arc::clone(&historic_store)));
    let regression_detector = Arc::new(RegressionDetector::new(Arc::clone(&historic_store), Arc::clone(&baseline_manager), SharedThresholds::default()));
    let push_channel = Arc::new(PushChannel::new(16));
    TestServices { historic_store, baseline_manager, trend_analyzer, regression_detector, push_channel }
}

//! bench-historian library
//!
//! Historic tracking and regression-analysis services for continuous
//! JSON-RPC benchmark runs.

use std::sync::Arc;

use sqlx::SqlitePool;

pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
#[cfg(test)]
mod tests;
pub mod utils;

pub use config::Config;
pub use services::{BaselineManager, HistoricStore, PushChannel, RegressionDetector, TrendAnalyzer};

/// Application shared state. All services are wrapped in `Arc` for cheap
/// cloning into handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<Config>,
    pub historic_store: Arc<HistoricStore>,
    pub baseline_manager: Arc<BaselineManager>,
    pub trend_analyzer: Arc<TrendAnalyzer>,
    pub regression_detector: Arc<RegressionDetector>,
    pub push_channel: Arc<PushChannel>,
}

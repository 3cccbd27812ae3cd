pub mod baseline_manager;
pub mod historic_store;
pub mod push_channel;
pub mod regression_detector;
pub mod trend_analyzer;

pub use baseline_manager::{diff_runs, BaselineManager, Comparison, DeltaClassification, MetricDelta};
pub use historic_store::HistoricStore;
pub use push_channel::{PushChannel, PushEvent};
pub use regression_detector::RegressionDetector;
pub use regression_detector::thresholds::SharedThresholds;
pub use trend_analyzer::{TrendAnalyzer, TrendQuery};

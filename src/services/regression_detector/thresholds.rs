//! Mutable, reader-writer-locked threshold table shared by the detector.
//!
//! Generalizes the "threshold object carries context, not a global"
//! structure of `DynamicThresholds`, but as a plain configuration object
//! owned by the detector instance rather than a package-scope mutable
//! singleton.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{Threshold, ThresholdTable};

#[derive(Clone)]
pub struct SharedThresholds(Arc<RwLock<ThresholdTable>>);

impl SharedThresholds {
    pub fn new(table: ThresholdTable) -> Self {
        Self(Arc::new(RwLock::new(table)))
    }

    pub async fn resolve(&self, metric_key: &str) -> Threshold {
        self.0.read().await.resolve(metric_key)
    }

    pub async fn get_all(&self) -> ThresholdTable {
        self.0.read().await.clone()
    }

    pub async fn set(&self, threshold: Threshold) {
        self.0.write().await.set(threshold);
    }
}

impl Default for SharedThresholds {
    fn default() -> Self {
        Self::new(ThresholdTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;

    #[tokio::test]
    async fn set_then_resolve_round_trips() {
        let shared = SharedThresholds::default();
        let custom = Threshold {
            metric_key: "p95_latency_ms".to_string(),
            minor_pct: 1.0,
            major_pct: 2.0,
            critical_pct: 3.0,
            direction: Direction::Increase,
            is_percentage_point: false,
            min_sample_size: 10,
            significance_level: 0.01,
        };
        shared.set(custom.clone()).await;
        let resolved = shared.resolve("p95_latency_ms").await;
        assert_eq!(resolved.minor_pct, custom.minor_pct);
    }
}

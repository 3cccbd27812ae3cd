use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Magnitude of a detected regression.
///
/// Ordered `Minor < Major < Critical` so callers can take the worst of
/// several findings with a plain `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

/// Which direction of change counts as a regression for a metric.
/// Error rates and latency regress on increase; throughput regresses on
/// decrease; a handful of metrics (e.g. connection reuse) can regress
/// either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
    Both,
}

/// Regression thresholds for a single metric key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Threshold {
    pub metric_key: String,
    pub minor_pct: f64,
    pub major_pct: f64,
    pub critical_pct: f64,
    pub direction: Direction,
    /// When true, `*_pct` are absolute percentage-point deltas (error
    /// rates) rather than relative percent change (latency, throughput).
    pub is_percentage_point: bool,
    pub min_sample_size: usize,
    pub significance_level: f64,
}

impl Threshold {
    fn relative(metric_key: &str, minor_pct: f64, major_pct: f64, critical_pct: f64, direction: Direction) -> Self {
        Self {
            metric_key: metric_key.to_string(),
            minor_pct,
            major_pct,
            critical_pct,
            direction,
            is_percentage_point: false,
            min_sample_size: 30,
            significance_level: 0.05,
        }
    }
}

/// Resolvable set of [`Threshold`]s, falling back to built-in defaults for
/// any metric key without an explicit override.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ThresholdTable {
    overrides: HashMap<String, Threshold>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self { overrides: default_thresholds() }
    }
}

impl ThresholdTable {
    pub fn new(overrides: HashMap<String, Threshold>) -> Self {
        let mut table = Self::default();
        table.overrides.extend(overrides);
        table
    }

    /// Resolve a threshold for `metric_key`: exact match wins, else
    /// substring match in priority order `latency`, `error`, `throughput`,
    /// else the global `default`.
    pub fn resolve(&self, metric_key: &str) -> Threshold {
        if let Some(t) = self.overrides.get(metric_key) {
            return t.clone();
        }
        if metric_key.contains("latency") {
            return self.overrides.get("latency").cloned().unwrap_or_else(default_latency);
        }
        if metric_key.contains("error") {
            return self.overrides.get("error_rate").cloned().unwrap_or_else(default_error_rate);
        }
        if metric_key.contains("throughput") || metric_key.ends_with("rps") {
            return self.overrides.get("throughput").cloned().unwrap_or_else(default_throughput);
        }
        self.overrides.get("default").cloned().unwrap_or_else(default_fallback)
    }

    pub fn set(&mut self, threshold: Threshold) {
        self.overrides.insert(threshold.metric_key.clone(), threshold);
    }
}

fn default_latency() -> Threshold {
    Threshold::relative("latency", 5.0, 15.0, 30.0, Direction::Increase)
}

fn default_throughput() -> Threshold {
    Threshold::relative("throughput", 5.0, 15.0, 30.0, Direction::Decrease)
}

fn default_error_rate() -> Threshold {
    let mut t = Threshold::relative("error_rate", 1.0, 5.0, 10.0, Direction::Increase);
    t.is_percentage_point = true;
    t.min_sample_size = 1;
    t
}

fn default_fallback() -> Threshold {
    Threshold::relative("default", 5.0, 10.0, 20.0, Direction::Both)
}

fn default_thresholds() -> HashMap<String, Threshold> {
    let mut map = HashMap::new();
    for t in [default_latency(), default_throughput(), default_error_rate(), default_fallback()] {
        map.insert(t.metric_key.clone(), t);
    }
    map
}

/// Pick the worst severity crossed by `magnitude`, or `None` if `magnitude`
/// is below the minor threshold. `magnitude` is already signed according to
/// `threshold.direction` (see `regression_detector::statistics`).
pub fn get_severity(threshold: &Threshold, magnitude: f64) -> Option<Severity> {
    if magnitude >= threshold.critical_pct {
        Some(Severity::Critical)
    } else if magnitude >= threshold.major_pct {
        Some(Severity::Major)
    } else if magnitude >= threshold.minor_pct {
        Some(Severity::Minor)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_latency_family() {
        let table = ThresholdTable::default();
        let t = table.resolve("eth_getBalance.p95_latency_ms");
        assert_eq!(t.metric_key, "latency");
        assert_eq!(t.minor_pct, 5.0);
    }

    #[test]
    fn resolve_falls_back_to_default_for_unknown_metric() {
        let table = ThresholdTable::default();
        let t = table.resolve("connection_reuse_rate");
        assert_eq!(t.metric_key, "default");
        assert_eq!(t.direction, Direction::Both);
        assert_eq!((t.minor_pct, t.major_pct, t.critical_pct), (5.0, 10.0, 20.0));
    }

    #[test]
    fn explicit_override_wins() {
        let mut table = ThresholdTable::default();
        table.set(Threshold::relative("p95_latency_ms", 1.0, 2.0, 3.0, Direction::Increase));
        let t = table.resolve("p95_latency_ms");
        assert_eq!(t.minor_pct, 1.0);
    }

    #[test]
    fn severity_thresholds_are_inclusive_lower_bound() {
        let t = default_latency();
        assert_eq!(get_severity(&t, 5.0), Some(Severity::Minor));
        assert_eq!(get_severity(&t, 15.0), Some(Severity::Major));
        assert_eq!(get_severity(&t, 30.0), Some(Severity::Critical));
        assert_eq!(get_severity(&t, 2.0), None);
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Minor < Severity::Major);
        assert!(Severity::Major < Severity::Critical);
    }
}

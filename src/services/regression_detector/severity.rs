//! Pure severity classification, exposed standalone as `GetSeverity` so
//! callers can classify a magnitude without running a full detection pass.

use crate::models::{get_severity as classify_magnitude, Direction, Severity, Threshold};

/// Determines the triggering magnitude for `threshold.direction`, and
/// classifies it. Returns `None` when the change doesn't trigger in the
/// configured direction at all (e.g. `direction = increase` but the
/// metric went down) — this is "no regression", not "severity none".
///
/// `absolute_change` and `percent_change` are `current - baseline` and
/// `(current - baseline) / baseline * 100` respectively; `percent_change`
/// is ignored for `is_percentage_point` metrics like `error_rate`.
pub fn get_severity(threshold: &Threshold, absolute_change: f64, percent_change: f64) -> Option<Severity> {
    let signed_magnitude = if threshold.is_percentage_point { absolute_change } else { percent_change };

    let magnitude = match threshold.direction {
        Direction::Increase => {
            if signed_magnitude <= 0.0 {
                return None;
            }
            signed_magnitude
        },
        Direction::Decrease => {
            if signed_magnitude >= 0.0 {
                return None;
            }
            -signed_magnitude
        },
        Direction::Both => signed_magnitude.abs(),
    };

    classify_magnitude(threshold, magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThresholdTable;

    #[test]
    fn increase_direction_ignores_improvements() {
        let table = ThresholdTable::default();
        let latency = table.resolve("avg_latency_ms");
        assert_eq!(get_severity(&latency, -10.0, -10.0), None);
    }

    #[test]
    fn increase_direction_flags_degradation() {
        let table = ThresholdTable::default();
        let latency = table.resolve("avg_latency_ms");
        assert_eq!(get_severity(&latency, 75.0, 50.0), Some(Severity::Critical));
    }

    #[test]
    fn throughput_decrease_direction_flags_drops() {
        let table = ThresholdTable::default();
        let throughput = table.resolve("throughput_rps");
        assert_eq!(get_severity(&throughput, -15.0, -20.0), Some(Severity::Major));
        assert_eq!(get_severity(&throughput, 15.0, 20.0), None);
    }

    #[test]
    fn error_rate_uses_absolute_percentage_points() {
        let table = ThresholdTable::default();
        let error_rate = table.resolve("error_rate");
        // 6 percentage points of absolute change, ignoring the inflated percent_change arg.
        assert_eq!(get_severity(&error_rate, 6.0, 600.0), Some(Severity::Major));
        assert_eq!(get_severity(&error_rate, 11.0, 1100.0), Some(Severity::Critical));
    }

    #[test]
    fn severity_monotonicity_holds() {
        let table = ThresholdTable::default();
        let latency = table.resolve("avg_latency_ms");
        let low = get_severity(&latency, 12.0, 12.0);
        let high = get_severity(&latency, 40.0, 40.0);
        assert!(low < high);
    }
}

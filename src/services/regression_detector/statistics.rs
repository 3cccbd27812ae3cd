//! Welch-style two-sample effect-size and p-value approximation from
//! stored summary statistics.

#[derive(Debug, Clone, Copy)]
pub struct SampleStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SignificanceResult {
    pub p_value: f64,
    pub effect_size: f64,
    pub is_significant: bool,
}

/// `None` when either sample is empty or the Welch standard error is zero
/// (no variance data available); callers fall back to the conservative
/// major-threshold rule in that case.
pub fn welch_test(baseline: SampleStats, current: SampleStats, significance_level: f64) -> Option<SignificanceResult> {
    if baseline.count == 0 || current.count == 0 {
        return None;
    }

    let se_sq = (baseline.std_dev.powi(2) / baseline.count as f64) + (current.std_dev.powi(2) / current.count as f64);
    if se_sq <= 0.0 {
        return None;
    }
    let se = se_sq.sqrt();

    let t = (current.mean - baseline.mean) / se;
    let p_value = 2.0 * (1.0 - standard_normal_cdf(t.abs()));

    let pooled_std = ((baseline.std_dev.powi(2) + current.std_dev.powi(2)) / 2.0).sqrt();
    let effect_size = if pooled_std > 0.0 { (current.mean - baseline.mean) / pooled_std } else { 0.0 };

    Some(SignificanceResult { p_value, effect_size, is_significant: p_value < significance_level })
}

fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz-Stegun 7.1.26 approximation, accurate to ~1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_samples_are_not_significant() {
        let a = SampleStats { mean: 100.0, std_dev: 10.0, count: 30 };
        let result = welch_test(a, a, 0.05).unwrap();
        assert!(result.p_value > 0.9);
        assert!(!result.is_significant);
    }

    #[test]
    fn large_separated_means_are_significant() {
        let baseline = SampleStats { mean: 100.0, std_dev: 5.0, count: 50 };
        let current = SampleStats { mean: 200.0, std_dev: 5.0, count: 50 };
        let result = welch_test(baseline, current, 0.05).unwrap();
        assert!(result.is_significant);
        assert!(result.effect_size > 1.0);
    }

    #[test]
    fn zero_variance_and_count_yields_none() {
        let a = SampleStats { mean: 100.0, std_dev: 0.0, count: 0 };
        let b = SampleStats { mean: 100.0, std_dev: 0.0, count: 10 };
        assert!(welch_test(a, b, 0.05).is_none());
    }
}

//! Report assembly: turns a flat list of pairwise comparisons into the
//! full [`RegressionReport`] shape — per-client and
//! per-method health scores, summary, risk assessment, recommendations.

use std::collections::HashMap;

use crate::models::{
    AnalysisStatus, ClientAnalysis, MethodAnalysis, MonitoringPriority, Regression,
    RecommendedAction, RegressionSummary, RiskAssessment, RiskLevel, Severity,
};

pub fn client_analysis(regressions: &[Regression], improvements: &[Regression], clients: &[String]) -> Vec<ClientAnalysis> {
    let mut out: Vec<ClientAnalysis> = clients
        .iter()
        .map(|client| {
            let regression_count = regressions.iter().filter(|r| &r.client == client).count();
            let improvement_count = improvements.iter().filter(|r| &r.client == client).count();
            let health_score = (100 - 10 * regression_count as i32 + 5 * improvement_count as i32).clamp(0, 100);
            let status = if regression_count > 0 {
                AnalysisStatus::Degraded
            } else if improvement_count > 0 {
                AnalysisStatus::Improved
            } else {
                AnalysisStatus::Stable
            };
            let risk_level = risk_band_by_count(regression_count);
            ClientAnalysis { client: client.clone(), regression_count, improvement_count, health_score, status, risk_level }
        })
        .collect();
    out.sort_by(|a, b| a.client.cmp(&b.client));
    out
}

fn risk_band_by_count(count: usize) -> RiskLevel {
    match count {
        0 => RiskLevel::Low,
        1 => RiskLevel::Medium,
        2 => RiskLevel::High,
        _ => RiskLevel::Critical,
    }
}

pub fn method_analysis(regressions: &[Regression], improvements: &[Regression]) -> Vec<MethodAnalysis> {
    let mut keys: Vec<(String, String)> = Vec::new();
    for r in regressions.iter().chain(improvements.iter()) {
        if let Some(method) = &r.method {
            let key = (r.client.clone(), method.clone());
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys.sort();

    keys.into_iter()
        .map(|(client, method)| {
            let regression_count = regressions.iter().filter(|r| r.client == client && r.method.as_deref() == Some(method.as_str())).count();
            let improvement_count = improvements.iter().filter(|r| r.client == client && r.method.as_deref() == Some(method.as_str())).count();
            let health_score = (100 - 15 * regression_count as i32 + 7 * improvement_count as i32).clamp(0, 100);
            let status = if regression_count > 0 {
                AnalysisStatus::Degraded
            } else if improvement_count > 0 {
                AnalysisStatus::Improved
            } else {
                AnalysisStatus::Stable
            };
            MethodAnalysis { client, method, regression_count, improvement_count, health_score, status }
        })
        .collect()
}

/// Alphabetical tie-break on "most affected".
fn most_affected<'a>(counts: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut tally: HashMap<&str, usize> = HashMap::new();
    for key in counts {
        *tally.entry(key).or_insert(0) += 1;
    }
    tally
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(name, _)| name.to_string())
}

pub fn summary(regressions: &[Regression], improvements: &[Regression], clients: &[String]) -> RegressionSummary {
    let minor = regressions.iter().filter(|r| r.severity == Severity::Minor).count();
    let major = regressions.iter().filter(|r| r.severity == Severity::Major).count();
    let critical = regressions.iter().filter(|r| r.severity == Severity::Critical).count();

    let worst_severity = regressions.iter().map(|r| r.severity).max();

    let affected_clients: std::collections::HashSet<&str> = regressions.iter().map(|r| r.client.as_str()).collect();
    let affected_methods: std::collections::HashSet<&str> = regressions.iter().filter_map(|r| r.method.as_deref()).collect();

    let most_affected_client = most_affected(regressions.iter().map(|r| r.client.as_str()));
    let most_affected_method = most_affected(regressions.iter().filter_map(|r| r.method.as_deref()));

    let overall_health = (100 - 20 * critical as i32 - 10 * major as i32 - 3 * minor as i32 + 2 * improvements.len() as i32).clamp(0, 100);

    let recommended_action = if critical > 0 || major > 0 {
        Some(RecommendedAction::Investigate)
    } else if minor > 0 {
        Some(RecommendedAction::Monitor)
    } else {
        Some(RecommendedAction::None)
    };

    let _ = clients;
    RegressionSummary {
        total: regressions.len(),
        minor,
        major,
        critical,
        worst_severity,
        clients_affected: affected_clients.len(),
        methods_affected: affected_methods.len(),
        most_affected_client,
        most_affected_method,
        overall_health,
        recommended_action,
    }
}

pub fn risk_assessment(summary: &RegressionSummary) -> RiskAssessment {
    let risk_score = (40.0 * summary.critical as f64 + 20.0 * summary.major as f64 + 5.0 * summary.minor as f64).min(100.0);
    let risk_level = if risk_score >= 80.0 {
        RiskLevel::Critical
    } else if risk_score >= 60.0 {
        RiskLevel::High
    } else if risk_score >= 30.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    let monitoring_priority = match risk_level {
        RiskLevel::Critical => MonitoringPriority::Immediate,
        RiskLevel::High => MonitoringPriority::Urgent,
        RiskLevel::Medium => MonitoringPriority::Elevated,
        RiskLevel::Low => MonitoringPriority::Routine,
    };
    RiskAssessment { risk_score, risk_level, monitoring_priority }
}

/// Deterministic, stably-ordered recommendation text. No randomness, no
/// wall-clock dependence, so two detection passes over the same data
/// always produce the same strings in the same order.
pub fn recommendations(summary: &RegressionSummary, regressions: &[Regression]) -> Vec<String> {
    let mut out = Vec::new();

    if summary.critical > 0 {
        out.push(format!("{} critical regression(s) detected — investigate before promoting this build.", summary.critical));
    }
    if summary.major > 0 {
        out.push(format!("{} major regression(s) detected — schedule a closer look.", summary.major));
    }
    if summary.minor > 0 {
        out.push(format!("{} minor regression(s) detected — keep monitoring, no immediate action required.", summary.minor));
    }
    if let Some(client) = &summary.most_affected_client {
        out.push(format!("Client \"{client}\" accounts for the largest share of regressions; start there."));
    }
    if summary.total == 0 {
        out.push("No regressions detected against the comparison basis.".to_string());
    }

    let mut critical_metrics: Vec<&str> = regressions.iter().filter(|r| r.severity == Severity::Critical).map(|r| r.metric_key.as_str()).collect();
    critical_metrics.sort();
    critical_metrics.dedup();
    for metric in critical_metrics {
        out.push(format!("Metric \"{metric}\" crossed the critical threshold in at least one comparison."));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn regression(client: &str, method: Option<&str>, severity: Severity) -> Regression {
        Regression {
            id: "id".into(),
            run_id: "r".into(),
            baseline_run_id: None,
            client: client.into(),
            method: method.map(|m| m.to_string()),
            metric_key: "avg_latency_ms".into(),
            baseline_value: 100.0,
            current_value: 150.0,
            absolute_change: 50.0,
            percent_change: 50.0,
            severity,
            is_significant: true,
            p_value: None,
            detected_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            notes: None,
        }
    }

    #[test]
    fn client_health_score_penalizes_regressions() {
        let regressions = vec![regression("geth", None, Severity::Major)];
        let analysis = client_analysis(&regressions, &[], &["geth".to_string()]);
        assert_eq!(analysis[0].health_score, 90);
        assert_eq!(analysis[0].status, AnalysisStatus::Degraded);
    }

    #[test]
    fn risk_band_escalates_with_critical_count() {
        let summary = RegressionSummary { critical: 2, ..Default::default() };
        let risk = risk_assessment(&summary);
        assert_eq!(risk.risk_level, RiskLevel::Critical);
        assert_eq!(risk.monitoring_priority, MonitoringPriority::Immediate);
    }

    #[test]
    fn most_affected_client_breaks_ties_alphabetically() {
        let regressions = vec![regression("geth", None, Severity::Minor), regression("besu", None, Severity::Minor)];
        let s = summary(&regressions, &[], &["geth".to_string(), "besu".to_string()]);
        assert_eq!(s.most_affected_client, Some("besu".to_string()));
    }

    #[test]
    fn zero_regressions_yields_perfect_health_and_no_action() {
        let s = summary(&[], &[], &["geth".to_string()]);
        assert_eq!(s.overall_health, 100);
        assert_eq!(s.recommended_action, Some(RecommendedAction::None));
    }
}

// Offline Policy Evaluation
//
// Scores each logged arm with inverse propensity scoring (IPS) and a doubly
// robust (DR) estimator over sessions that carry an (arm, propensity)
// decision. Rewards are overall ratings.

use crate::error::Result;
use crate::storage::SessionStore;
use crate::types::FeedbackEvent;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const DEFAULT_REWARD: f64 = 3.0;
const MIN_PROPENSITY: f64 = 1e-9;
const Z_95: f64 = 1.96;

/// One logged decision: arm served, its propensity, observed reward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedDecision {
    pub arm: String,
    pub propensity: f64,
    pub reward: f64,
}

impl LoggedDecision {
    pub fn from_event(event: &FeedbackEvent) -> Option<Self> {
        let decision = event.decision.as_ref()?;
        let arm = decision.arm.trim();
        if arm.is_empty() {
            return None;
        }
        Some(Self {
            arm: arm.to_string(),
            propensity: decision.propensity,
            reward: event
                .rating_overall
                .filter(|r| r.is_finite())
                .unwrap_or(DEFAULT_REWARD),
        })
    }

    fn propensity(&self) -> f64 {
        if self.propensity.is_finite() {
            self.propensity.max(MIN_PROPENSITY)
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lo: f64,
    pub hi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmEstimate {
    pub ips: f64,
    pub ips_ci: ConfidenceInterval,
    pub dr: f64,
    pub dr_ci: ConfidenceInterval,
    /// Rows in which this arm was served
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineReport {
    pub arms: BTreeMap<String, ArmEstimate>,
    /// Logged decisions evaluated
    pub n: usize,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Normal-approximation 95% interval using the population stdev
fn interval(center: f64, terms: &[f64]) -> ConfidenceInterval {
    if terms.len() <= 1 {
        return ConfidenceInterval {
            lo: center,
            hi: center,
        };
    }
    let n = terms.len() as f64;
    let variance = terms.iter().map(|t| (t - center).powi(2)).sum::<f64>() / n;
    let half = Z_95 * variance.sqrt() / n.sqrt();
    ConfidenceInterval {
        lo: center - half,
        hi: center + half,
    }
}

fn estimate(target: &str, rows: &[LoggedDecision], mu: &BTreeMap<String, f64>) -> ArmEstimate {
    let overall = mean(&rows.iter().map(|r| r.reward).collect::<Vec<_>>());
    let mu_target = mu.get(target).copied().unwrap_or(overall);

    let mut ips_terms = Vec::with_capacity(rows.len());
    let mut dr_terms = Vec::with_capacity(rows.len());
    let mut samples = 0;
    for row in rows {
        if row.arm == target {
            samples += 1;
            let pi = row.propensity();
            ips_terms.push(row.reward / pi);
            dr_terms.push(mu_target + (row.reward - mu_target) / pi);
        } else {
            ips_terms.push(0.0);
            dr_terms.push(mu_target);
        }
    }

    let ips = mean(&ips_terms);
    let dr = mean(&dr_terms);
    ArmEstimate {
        ips,
        ips_ci: interval(ips, &ips_terms),
        dr,
        dr_ci: interval(dr, &dr_terms),
        samples,
    }
}

/// IPS and DR estimates for every arm present in `rows`
pub fn evaluate(rows: &[LoggedDecision]) -> OfflineReport {
    let mut by_arm: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        by_arm.entry(row.arm.clone()).or_default().push(row.reward);
    }
    let mu: BTreeMap<String, f64> = by_arm
        .iter()
        .map(|(arm, rewards)| (arm.clone(), mean(rewards)))
        .collect();

    let arms = by_arm
        .keys()
        .map(|arm| (arm.clone(), estimate(arm, rows, &mu)))
        .collect();

    OfflineReport {
        arms,
        n: rows.len(),
    }
}

pub struct OfflineEvaluator {
    sessions: Arc<dyn SessionStore>,
}

impl OfflineEvaluator {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }

    /// Evaluate logged decisions from the last `window_days`
    pub fn evaluate(&self, window_days: u32, now: DateTime<Utc>) -> Result<OfflineReport> {
        let since = now - Duration::days(i64::from(window_days));
        let rows: Vec<LoggedDecision> = self
            .sessions
            .list(Some(since))?
            .iter()
            .filter_map(LoggedDecision::from_event)
            .collect();

        let report = evaluate(&rows);
        tracing::info!(
            "Offline evaluation over {} decisions, {} arms",
            report.n,
            report.arms.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(arm: &str, propensity: f64, reward: f64) -> LoggedDecision {
        LoggedDecision {
            arm: arm.to_string(),
            propensity,
            reward,
        }
    }

    #[test]
    fn test_ips_reference_scenario() {
        let rows = vec![
            row("A", 1.0, 4.0),
            row("A", 0.5, 2.0),
            row("B", 1.0, 3.0),
            row("B", 1.0, 3.0),
        ];
        let report = evaluate(&rows);
        assert_eq!(report.n, 4);

        let a = &report.arms["A"];
        // (4 + 4 + 0 + 0) / 4
        assert!((a.ips - 2.0).abs() < 1e-9);
        assert_eq!(a.samples, 2);
        assert!(a.ips_ci.lo < a.ips && a.ips < a.ips_ci.hi);

        let b = &report.arms["B"];
        assert!((b.ips - 1.5).abs() < 1e-9);
        // mu_B = 3 and B rows match it exactly
        assert!((b.dr - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_row_has_degenerate_interval() {
        let report = evaluate(&[row("A", 0.5, 4.0)]);
        let a = &report.arms["A"];
        assert!((a.ips - 8.0).abs() < 1e-9);
        assert_eq!(a.ips_ci.lo, a.ips_ci.hi);
    }

    #[test]
    fn test_missing_arms_are_absent() {
        let report = evaluate(&[]);
        assert!(report.arms.is_empty());
        assert_eq!(report.n, 0);
    }

    #[test]
    fn test_propensity_floor() {
        let report = evaluate(&[row("A", 0.0, 1.0)]);
        assert!(report.arms["A"].ips.is_finite());
        assert!((report.arms["A"].ips - 1e9).abs() < 1.0);
    }
}

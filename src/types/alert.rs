//! Severity levels and alerted output tables

use crate::types::hazard::{Hazard, ScoredTable};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label of the overall alert when no hazard produced a score for a row.
pub const NO_RISKS_PREDICTED: &str = "No Risks Predicted";

/// Alert severity, ordered `Low < Moderate < High < Severe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Moderate,
    High,
    Severe,
}

impl Severity {
    /// Lower bound of `Moderate`, inclusive.
    pub const MODERATE_FROM: f64 = 0.1;
    /// Lower bound of `High`, inclusive.
    pub const HIGH_FROM: f64 = 0.3;
    /// Lower bound of `Severe`, inclusive.
    pub const SEVERE_FROM: f64 = 0.5;

    /// Rule-based severity of a hazard probability.
    pub fn from_probability(prob: f64) -> Self {
        if prob < Self::MODERATE_FROM {
            Severity::Low
        } else if prob < Self::HIGH_FROM {
            Severity::Moderate
        } else if prob < Self::SEVERE_FROM {
            Severity::High
        } else {
            Severity::Severe
        }
    }

    /// Position in the severity order, starting at 0 for `Low`.
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::High => "High",
            Severity::Severe => "Severe",
        }
    }

    /// Operator guidance shown next to the label.
    pub fn advice(self) -> &'static str {
        match self {
            Severity::Low => "No Action",
            Severity::Moderate => "Stay Alert",
            Severity::High => "Prepare Precautions",
            Severity::Severe => "Take Immediate Action",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregated alert for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallAlert {
    Risk(Severity),
    /// No hazard produced a score for the row.
    NoRisksPredicted,
}

impl OverallAlert {
    pub fn severity(self) -> Option<Severity> {
        match self {
            OverallAlert::Risk(s) => Some(s),
            OverallAlert::NoRisksPredicted => None,
        }
    }
}

impl From<Option<Severity>> for OverallAlert {
    fn from(severity: Option<Severity>) -> Self {
        severity.map_or(OverallAlert::NoRisksPredicted, OverallAlert::Risk)
    }
}

impl fmt::Display for OverallAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallAlert::Risk(s) => s.fmt(f),
            OverallAlert::NoRisksPredicted => f.write_str(NO_RISKS_PREDICTED),
        }
    }
}

/// Per-row severities of one hazard; `None` where the probability is undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardAlerts {
    pub hazard: Hazard,
    pub alerts: Vec<Option<Severity>>,
}

/// Final pipeline output: scored table, per-hazard alerts and overall alert.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertedTable {
    scored: ScoredTable,
    alerts: Vec<HazardAlerts>,
    overall: Vec<OverallAlert>,
}

impl AlertedTable {
    pub(crate) fn new(
        scored: ScoredTable,
        alerts: Vec<HazardAlerts>,
        overall: Vec<OverallAlert>,
    ) -> Self {
        Self {
            scored,
            alerts,
            overall,
        }
    }

    pub fn scored(&self) -> &ScoredTable {
        &self.scored
    }

    pub fn hazard_alerts(&self) -> &[HazardAlerts] {
        &self.alerts
    }

    pub fn alerts_for(&self, hazard: &Hazard) -> Option<&[Option<Severity>]> {
        self.alerts
            .iter()
            .find(|a| &a.hazard == hazard)
            .map(|a| a.alerts.as_slice())
    }

    pub fn overall(&self) -> &[OverallAlert] {
        &self.overall
    }

    pub fn len(&self) -> usize {
        self.overall.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overall.is_empty()
    }

    /// The assessment for the most recent hour, if any.
    pub fn latest(&self) -> Option<RiskAssessment> {
        let row = self.len().checked_sub(1)?;
        let timestamp = *self.scored.features().timestamps().get(row)?;

        let hazards = self
            .scored
            .scores()
            .iter()
            .zip(&self.alerts)
            .map(|(scores, alerts)| HazardAssessment {
                hazard: scores.hazard.clone(),
                probability: scores.probability[row],
                alert: alerts.alerts[row],
            })
            .collect();

        Some(RiskAssessment {
            timestamp,
            hazards,
            overall: self.overall[row],
        })
    }
}

/// One hazard's entry in a `RiskAssessment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardAssessment {
    pub hazard: Hazard,
    pub probability: Option<f64>,
    pub alert: Option<Severity>,
}

/// Snapshot of a single hour, as shown in the latest-risk panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub timestamp: NaiveDateTime,
    pub hazards: Vec<HazardAssessment>,
    pub overall: OverallAlert,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_probability() {
        assert_eq!(Severity::from_probability(0.05), Severity::Low);
        assert_eq!(Severity::from_probability(0.25), Severity::Moderate);
        assert_eq!(Severity::from_probability(0.45), Severity::High);
        assert_eq!(Severity::from_probability(0.95), Severity::Severe);
    }

    #[test]
    fn test_lower_bounds_are_inclusive() {
        assert_eq!(Severity::from_probability(0.0), Severity::Low);
        assert_eq!(Severity::from_probability(0.1), Severity::Moderate);
        assert_eq!(Severity::from_probability(0.3), Severity::High);
        assert_eq!(Severity::from_probability(0.5), Severity::Severe);
        assert_eq!(Severity::from_probability(1.0), Severity::Severe);
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Low < Severity::Moderate);
        assert!(Severity::Moderate < Severity::High);
        assert!(Severity::High < Severity::Severe);
        assert_eq!(Severity::Severe.rank(), 3);
    }

    #[test]
    fn test_overall_display() {
        assert_eq!(OverallAlert::Risk(Severity::High).to_string(), "High");
        assert_eq!(OverallAlert::NoRisksPredicted.to_string(), "No Risks Predicted");
        assert_eq!(OverallAlert::from(None), OverallAlert::NoRisksPredicted);
    }

    #[test]
    fn test_overall_alert_serialization() {
        let json = serde_json::to_string(&OverallAlert::Risk(Severity::Severe)).unwrap();
        assert_eq!(json, r#"{"risk":"Severe"}"#);
        let json = serde_json::to_string(&OverallAlert::NoRisksPredicted).unwrap();
        assert_eq!(json, r#""no_risks_predicted""#);
    }
}

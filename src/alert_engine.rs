//! Rule-based alert assignment and overall aggregation

use crate::types::alert::{AlertedTable, HazardAlerts, OverallAlert, Severity};
use crate::types::hazard::ScoredTable;

/// Maps hazard probabilities to severities and reduces them to one alert per row.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertEngine;

impl AlertEngine {
    pub fn new() -> Self {
        Self
    }

    /// Attach per-hazard alerts and the overall alert to a scored table.
    ///
    /// An undefined probability yields an undefined alert. The overall alert is
    /// the highest severity over the defined hazards of the row, or
    /// `NoRisksPredicted` when none is defined.
    pub fn apply(&self, scored: ScoredTable) -> AlertedTable {
        let alerts: Vec<HazardAlerts> = scored
            .scores()
            .iter()
            .map(|s| HazardAlerts {
                hazard: s.hazard.clone(),
                alerts: s
                    .probability
                    .iter()
                    .map(|p| p.map(Severity::from_probability))
                    .collect(),
            })
            .collect();

        // Columnwise max; `None` orders below every severity.
        let mut highest: Vec<Option<Severity>> = vec![None; scored.len()];
        for column in &alerts {
            for (acc, alert) in highest.iter_mut().zip(&column.alerts) {
                *acc = (*acc).max(*alert);
            }
        }
        let overall = highest.into_iter().map(OverallAlert::from).collect();

        AlertedTable::new(scored, alerts, overall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hazard::{Hazard, HazardScores};
    use crate::types::table::test_support::hours;
    use crate::types::table::{FeatureColumn, FeatureTable};

    fn scored(scores: Vec<HazardScores>, rows: usize) -> ScoredTable {
        let features = FeatureTable::new(
            hours(rows),
            vec![FeatureColumn {
                name: "month".to_string(),
                values: vec![7.0; rows],
            }],
        )
        .unwrap();
        ScoredTable::new(features, scores).unwrap()
    }

    fn defined(hazard: &str, probability: Vec<f64>) -> HazardScores {
        let prediction = probability.iter().map(|&p| u8::from(p >= 0.5)).collect();
        HazardScores::new(Hazard::new(hazard), probability, prediction)
    }

    #[test]
    fn test_per_hazard_alerts() {
        let table = AlertEngine::new().apply(scored(vec![defined("flood", vec![0.05, 0.25, 0.45, 0.95])], 4));
        assert_eq!(
            table.alerts_for(&Hazard::new("flood")).unwrap(),
            &[
                Some(Severity::Low),
                Some(Severity::Moderate),
                Some(Severity::High),
                Some(Severity::Severe)
            ]
        );
    }

    #[test]
    fn test_overall_is_highest_severity() {
        let table = AlertEngine::new().apply(scored(
            vec![
                defined("flood", vec![0.05]),
                defined("rain", vec![0.35]),
                defined("storm", vec![0.12]),
            ],
            1,
        ));
        assert_eq!(table.overall(), &[OverallAlert::Risk(Severity::High)]);
    }

    #[test]
    fn test_undefined_hazards_are_excluded() {
        let table = AlertEngine::new().apply(scored(
            vec![
                defined("flood", vec![0.2, 0.01]),
                HazardScores::undefined(Hazard::new("storm"), 2, "failed"),
            ],
            2,
        ));
        assert_eq!(table.alerts_for(&Hazard::new("storm")).unwrap(), &[None, None]);
        assert_eq!(
            table.overall(),
            &[
                OverallAlert::Risk(Severity::Moderate),
                OverallAlert::Risk(Severity::Low)
            ]
        );
    }

    #[test]
    fn test_no_defined_hazard_means_no_risks_predicted() {
        let table = AlertEngine::new().apply(scored(
            vec![HazardScores::undefined(Hazard::new("flood"), 2, "failed")],
            2,
        ));
        assert_eq!(table.overall(), &[OverallAlert::NoRisksPredicted; 2]);

        let empty = AlertEngine::new().apply(scored(vec![], 2));
        assert_eq!(empty.overall(), &[OverallAlert::NoRisksPredicted; 2]);
    }

    #[test]
    fn test_latest_assessment() {
        let table = AlertEngine::new().apply(scored(
            vec![
                defined("flood", vec![0.05, 0.6]),
                HazardScores::undefined(Hazard::new("rain"), 2, "failed"),
            ],
            2,
        ));
        let latest = table.latest().unwrap();
        assert_eq!(latest.timestamp, hours(2)[1]);
        assert_eq!(latest.overall, OverallAlert::Risk(Severity::Severe));
        assert_eq!(latest.hazards[0].probability, Some(0.6));
        assert_eq!(latest.hazards[1].alert, None);
    }
}

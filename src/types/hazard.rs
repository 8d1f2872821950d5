//! Hazard identifiers and per-hazard model outputs

use crate::error::{PipelineError, PipelineResult};
use crate::types::table::FeatureTable;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hazards scored by the shipped configuration.
pub const DEFAULT_HAZARDS: [&str; 4] = ["flood", "rain", "storm", "landslide"];

/// Identifier of one independently scored hazard (e.g. `flood`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hazard(String);

impl Hazard {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{hazard}_risk_prob`
    pub fn prob_column(&self) -> String {
        format!("{}_risk_prob", self.0)
    }

    /// `{hazard}_risk_pred`
    pub fn pred_column(&self) -> String {
        format!("{}_risk_pred", self.0)
    }

    /// `{hazard}_risk_alert`
    pub fn alert_column(&self) -> String {
        format!("{}_risk_alert", self.0)
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Hazard {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Probability and predicted class for every row of one hazard.
///
/// `None` is the undefined marker: the model failed for this hazard and the
/// value was not computed.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardScores {
    pub hazard: Hazard,
    pub probability: Vec<Option<f64>>,
    pub prediction: Vec<Option<u8>>,
    /// Cause of the scoring failure, if the hazard is undefined.
    pub failure: Option<String>,
}

impl HazardScores {
    pub fn new(hazard: Hazard, probability: Vec<f64>, prediction: Vec<u8>) -> Self {
        Self {
            hazard,
            probability: probability.into_iter().map(Some).collect(),
            prediction: prediction.into_iter().map(Some).collect(),
            failure: None,
        }
    }

    /// Every row undefined, with the failure recorded.
    pub fn undefined(hazard: Hazard, rows: usize, failure: impl Into<String>) -> Self {
        Self {
            hazard,
            probability: vec![None; rows],
            prediction: vec![None; rows],
            failure: Some(failure.into()),
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.failure.is_some()
    }

    pub fn len(&self) -> usize {
        self.probability.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probability.is_empty()
    }
}

/// Feature table plus one `HazardScores` per registered hazard.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTable {
    features: FeatureTable,
    scores: Vec<HazardScores>,
}

impl ScoredTable {
    pub fn new(features: FeatureTable, scores: Vec<HazardScores>) -> PipelineResult<Self> {
        for s in &scores {
            if s.probability.len() != features.len() || s.prediction.len() != features.len() {
                return Err(PipelineError::ColumnLength {
                    column: s.hazard.prob_column(),
                    expected: features.len(),
                    actual: s.probability.len().min(s.prediction.len()),
                });
            }
        }
        Ok(Self { features, scores })
    }

    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    pub fn scores(&self) -> &[HazardScores] {
        &self.scores
    }

    pub fn hazard(&self, hazard: &Hazard) -> Option<&HazardScores> {
        self.scores.iter().find(|s| &s.hazard == hazard)
    }

    pub fn hazards(&self) -> impl Iterator<Item = &Hazard> {
        self.scores.iter().map(|s| &s.hazard)
    }

    /// Hazards that could not be scored, with their causes.
    pub fn failures(&self) -> impl Iterator<Item = (&Hazard, &str)> {
        self.scores
            .iter()
            .filter_map(|s| s.failure.as_deref().map(|f| (&s.hazard, f)))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names() {
        let hazard = Hazard::new("landslide");
        assert_eq!(hazard.prob_column(), "landslide_risk_prob");
        assert_eq!(hazard.pred_column(), "landslide_risk_pred");
        assert_eq!(hazard.alert_column(), "landslide_risk_alert");
    }

    #[test]
    fn test_undefined_scores_carry_cause() {
        let scores = HazardScores::undefined("storm".into(), 3, "model exploded");
        assert!(scores.is_undefined());
        assert_eq!(scores.probability, vec![None; 3]);
        assert_eq!(scores.prediction, vec![None; 3]);
        assert_eq!(scores.failure.as_deref(), Some("model exploded"));
    }
}

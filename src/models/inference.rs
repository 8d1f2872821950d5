//! Multi-model inference engine for hazard scoring

use crate::error::{PipelineError, PipelineResult};
use crate::metrics::PipelineMetrics;
use crate::models::alignment::{align, ClipRanges, FeatureScaler};
use crate::models::registry::{ModelRegistry, RegisteredModel};
use crate::models::scorer::HazardModel;
use crate::types::hazard::{HazardScores, ScoredTable};
use crate::types::table::FeatureTable;
use anyhow::{ensure, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Scores every registered hazard over a feature table.
///
/// Each hazard is isolated: a model that fails marks its own hazard undefined
/// and the remaining hazards are scored as usual.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    registry: Arc<ModelRegistry>,
    clip_ranges: Option<ClipRanges>,
    scaler: Option<FeatureScaler>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl InferenceEngine {
    /// Create a new inference engine over a loaded registry
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            clip_ranges: None,
            scaler: None,
            metrics: None,
        }
    }

    /// Clamp aligned inputs into per-feature bounds before scoring
    pub fn with_clip_ranges(mut self, clip_ranges: ClipRanges) -> Self {
        self.clip_ranges = Some(clip_ranges);
        self
    }

    /// Standardize aligned inputs after clipping
    pub fn with_scaler(mut self, scaler: FeatureScaler) -> Self {
        self.scaler = Some(scaler);
        self
    }

    /// Report per-hazard scoring times and failures
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Get the number of registered models
    pub fn model_count(&self) -> usize {
        self.registry.len()
    }

    /// Score all hazards, returning the feature table with their outputs attached.
    pub fn score(&self, features: FeatureTable) -> PipelineResult<ScoredTable> {
        if features.num_columns() == 0 {
            return Err(PipelineError::NoNumericFeatures);
        }
        if self.registry.is_empty() {
            return Err(PipelineError::EmptyRegistry);
        }

        let scores: Vec<HazardScores> = self
            .registry
            .entries()
            .iter()
            .map(|entry| self.score_isolated(entry, &features))
            .collect();

        let failed = scores.iter().filter(|s| s.is_undefined()).count();
        info!(
            rows = features.len(),
            hazards = scores.len(),
            failed = failed,
            "Inference complete"
        );

        ScoredTable::new(features, scores)
    }

    fn score_isolated(&self, entry: &RegisteredModel, features: &FeatureTable) -> HazardScores {
        let started = Instant::now();
        let result = self.score_hazard(entry.model.as_ref(), features);
        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_hazard_time(entry.hazard.as_str(), elapsed);
        }

        match result {
            Ok((probability, prediction)) => {
                debug!(
                    hazard = %entry.hazard,
                    family = entry.model.family(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "Hazard scored"
                );
                HazardScores::new(entry.hazard.clone(), probability, prediction)
            }
            Err(e) => {
                let cause = format!("{e:#}");
                warn!(
                    hazard = %entry.hazard,
                    family = entry.model.family(),
                    error = %cause,
                    "Prediction failed, hazard marked undefined"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_hazard_failure(entry.hazard.as_str());
                }
                HazardScores::undefined(entry.hazard.clone(), features.len(), cause)
            }
        }
    }

    fn score_hazard(
        &self,
        model: &dyn HazardModel,
        features: &FeatureTable,
    ) -> Result<(Vec<f64>, Vec<u8>)> {
        let mut x = align(features, model.feature_names());
        if let Some(ranges) = &self.clip_ranges {
            ranges.apply(&mut x);
        }
        if let Some(scaler) = &self.scaler {
            scaler.apply(&mut x);
        }

        let output = model.evaluate(&x)?;
        let probability = output.positive_probability()?;
        let prediction = output.predictions;

        for (what, len) in [("probability", probability.len()), ("prediction", prediction.len())] {
            ensure!(
                len == x.rows(),
                "model returned {} {} values for {} rows",
                len,
                what,
                x.rows()
            );
        }
        ensure!(
            probability.iter().chain(&prediction).all(|v| v.is_finite()),
            "model returned non-finite output"
        );

        let prediction = prediction
            .into_iter()
            .map(|p| u8::from(p >= 0.5))
            .collect();
        Ok((probability, prediction))
    }
}

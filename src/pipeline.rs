//! One forecast cycle: features, inference, alerts

use crate::alert_engine::AlertEngine;
use crate::error::PipelineResult;
use crate::feature_engine::FeatureEngine;
use crate::models::inference::InferenceEngine;
use crate::types::alert::AlertedTable;
use crate::types::table::ObservationTable;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a forecast cycle for one location
#[derive(Debug, Clone)]
pub struct ForecastCycle {
    pub run_id: Uuid,
    pub location: String,
    pub table: AlertedTable,
    pub elapsed: Duration,
}

/// Feature engineering, scoring and alerting chained over one observation table.
#[derive(Debug, Clone)]
pub struct HazardPipeline {
    features: FeatureEngine,
    inference: InferenceEngine,
    alerts: AlertEngine,
}

impl HazardPipeline {
    pub fn new(features: FeatureEngine, inference: InferenceEngine) -> Self {
        Self {
            features,
            inference,
            alerts: AlertEngine::new(),
        }
    }

    pub fn feature_engine(&self) -> &FeatureEngine {
        &self.features
    }

    pub fn inference(&self) -> &InferenceEngine {
        &self.inference
    }

    /// Run a full cycle. Scoring failures of individual hazards do not fail
    /// the cycle; configuration errors do.
    pub fn run(&self, location: &str, observations: &ObservationTable) -> PipelineResult<ForecastCycle> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        let features = self.features.engineer(observations)?;
        debug!(
            %run_id,
            location,
            rows = features.len(),
            features = features.num_columns(),
            "Features engineered"
        );

        let scored = self.inference.score(features)?;
        let table = self.alerts.apply(scored);
        let elapsed = started.elapsed();

        info!(
            %run_id,
            location,
            rows = table.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Forecast cycle complete"
        );

        Ok(ForecastCycle {
            run_id,
            location: location.to_string(),
            table,
            elapsed,
        })
    }
}

//! Hazard Risk Pipeline Library
//!
//! Turns hourly weather observations into per-hazard risk probabilities and
//! four-level alerts: feature engineering, multi-model scoring against a
//! registry of pre-trained models, then rule-based alert aggregation.

pub mod alert_engine;
pub mod config;
pub mod error;
pub mod feature_engine;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod types;

pub use alert_engine::AlertEngine;
pub use config::AppConfig;
pub use error::{PipelineError, PipelineResult};
pub use feature_engine::FeatureEngine;
pub use models::{InferenceEngine, ModelLoader, ModelRegistry};
pub use pipeline::{ForecastCycle, HazardPipeline};
pub use types::{AlertedTable, FeatureTable, ObservationTable, OverallAlert, Severity};

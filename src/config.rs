//! Configuration management for the hazard pipeline

use crate::types::hazard::{Hazard, DEFAULT_HAZARDS};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub features: FeatureConfig,
    pub models: ModelsConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    /// One forecast cycle runs per location
    pub locations: Vec<LocationConfig>,
}

/// Feature engineering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Base columns that get lag features
    pub lag_columns: Vec<String>,
    /// Lag offsets in hours
    pub lags: Vec<usize>,
    /// Trailing-window aggregates
    pub rolling: Vec<RollingSpec>,
    /// Binary threshold indicators
    pub flags: Vec<FlagSpec>,
    /// Pairwise products of base columns
    pub interactions: Vec<InteractionSpec>,
    /// Add `hour_sin` / `hour_cos` next to the month encodings
    pub hour_encoding: bool,
    /// Omit derived features whose base column is absent instead of failing
    pub tolerate_missing_columns: bool,
}

/// Aggregate applied over a rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RollingAggregate {
    #[default]
    Mean,
    Sum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingSpec {
    pub column: String,
    /// Window sizes in hours
    pub windows: Vec<usize>,
    #[serde(default)]
    pub aggregate: RollingAggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagSpec {
    /// Output column name
    pub name: String,
    pub column: String,
    /// Flag is 1 when the column is strictly above this value
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSpec {
    /// Output column name
    pub name: String,
    pub left: String,
    pub right: String,
}

/// Model store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory containing one `{hazard}.json` descriptor per hazard
    pub models_dir: String,
    /// Hazards to score, in output order
    pub hazards: Vec<String>,
    /// Optional JSON file of per-feature `[min, max]` bounds
    pub clip_ranges_path: Option<String>,
    /// Optional JSON file of per-feature `{mean, scale}` standardization
    pub scaler_path: Option<String>,
    /// Number of threads for ONNX inference per model (default: 1)
    pub onnx_threads: usize,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of forecast cycles running at once
    pub workers: usize,
    /// Directory receiving one result CSV per location
    pub output_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

/// A location whose observations are scored each cycle
#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    pub name: String,
    /// Path to the hourly observation CSV
    pub observations: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path.
    ///
    /// `HAZARD__SECTION__KEY` environment variables override file values.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("HAZARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl ModelsConfig {
    pub fn hazard_ids(&self) -> Vec<Hazard> {
        self.hazards.iter().map(|h| Hazard::new(h.as_str())).collect()
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        let lag_columns = [
            "temperature_mean",
            "relative_humidity_mean",
            "rain_sum",
            "precipitation_sum",
            "wind_speed_max",
            "wind_gust_max",
            "soil_moisture_mean",
            "sea_level_pressure_mean",
        ];
        let rolling = ["rain_sum", "precipitation_sum", "wind_speed_max", "wind_gust_max"]
            .iter()
            .map(|c| RollingSpec {
                column: c.to_string(),
                windows: vec![3, 6],
                aggregate: RollingAggregate::Mean,
            })
            .collect();

        Self {
            lag_columns: lag_columns.iter().map(|c| c.to_string()).collect(),
            lags: vec![1, 3, 6],
            rolling,
            flags: vec![
                FlagSpec {
                    name: "heavy_rain_flag".to_string(),
                    column: "rain_sum".to_string(),
                    threshold: 10.0,
                },
                FlagSpec {
                    name: "strong_wind_flag".to_string(),
                    column: "wind_gust_max".to_string(),
                    threshold: 40.0,
                },
            ],
            interactions: vec![InteractionSpec {
                name: "precip_soil_interaction".to_string(),
                left: "precipitation_sum".to_string(),
                right: "soil_moisture_mean".to_string(),
            }],
            hour_encoding: true,
            tolerate_missing_columns: false,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: "models".to_string(),
            hazards: DEFAULT_HAZARDS.iter().map(|h| h.to_string()).collect(),
            clip_ranges_path: None,
            scaler_path: None,
            onnx_threads: 1,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            output_dir: "output".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

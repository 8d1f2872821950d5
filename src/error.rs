//! Fatal error taxonomy for the hazard pipeline.
//!
//! Everything here aborts a forecast cycle. Per-model scoring failures are not
//! represented: the inference engine isolates them per hazard and records the
//! hazard as undefined instead.

use thiserror::Error;

/// Configuration and data-shape errors that abort the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A derived feature needs a base column the observation table lacks.
    #[error("feature `{feature}` requires missing column `{column}`")]
    MissingColumn { feature: String, column: String },

    /// Two columns would end up with the same name.
    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),

    /// A lag offset or rolling window that cannot be computed.
    #[error("invalid feature configuration: {0}")]
    InvalidFeatureConfig(String),

    /// A column does not have one value per timestamp.
    #[error("column `{column}` has {actual} values, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Timestamps must strictly increase.
    #[error("timestamps not strictly increasing at row {row}")]
    UnorderedTimestamps { row: usize },

    /// A hazard was registered twice.
    #[error("hazard `{0}` registered more than once")]
    DuplicateHazard(String),

    /// No hazard model could be loaded.
    #[error("model registry is empty")]
    EmptyRegistry,

    /// The feature table carries nothing a model could consume.
    #[error("no numeric features available for prediction")]
    NoNumericFeatures,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

//! Hazard model components

pub mod alignment;
pub mod inference;
pub mod loader;
pub mod onnx;
pub mod registry;
pub mod scorer;

pub use alignment::{align, ClipRanges, FeatureMatrix, FeatureScaler};
pub use inference::InferenceEngine;
pub use loader::{ModelArtifact, ModelLoader};
pub use registry::ModelRegistry;
pub use scorer::{HazardModel, ModelOutput};

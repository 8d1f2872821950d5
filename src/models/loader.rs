//! Model store loader.
//!
//! The store is a directory holding one JSON descriptor per hazard,
//! `{models_dir}/{hazard}.json`. ONNX descriptors point at a graph file next
//! to the descriptor.

use crate::error::PipelineError;
use crate::models::onnx::OnnxModel;
use crate::models::registry::ModelRegistry;
use crate::models::scorer::{
    HazardModel, LinearRegressor, LogisticClassifier, SingleClassClassifier, UnavailableModel,
};
use crate::types::hazard::Hazard;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

fn default_classes() -> Vec<i64> {
    vec![0, 1]
}

/// On-disk description of a pre-trained hazard model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    /// Binary logistic classifier
    Logistic {
        #[serde(default)]
        features: Option<Vec<String>>,
        coefficients: Vec<f64>,
        intercept: f64,
        #[serde(default = "default_classes")]
        classes: Vec<i64>,
    },
    /// Classifier that only saw one class during training
    SingleClass {
        #[serde(default)]
        features: Option<Vec<String>>,
        class: i64,
    },
    /// Regressor whose output is used as the probability
    Linear {
        #[serde(default)]
        features: Option<Vec<String>>,
        coefficients: Vec<f64>,
        intercept: f64,
    },
    /// ONNX graph, path relative to the descriptor
    Onnx {
        path: String,
        features: Vec<String>,
        #[serde(default = "default_classes")]
        classes: Vec<i64>,
    },
}

/// Loader for the model store
#[derive(Debug, Clone)]
pub struct ModelLoader {
    models_dir: PathBuf,
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a loader for `models_dir` with default settings (1 thread)
    pub fn new<P: AsRef<Path>>(models_dir: P) -> Self {
        Self::with_threads(models_dir, 1)
    }

    /// Create a loader with the given number of ONNX threads
    pub fn with_threads<P: AsRef<Path>>(models_dir: P, onnx_threads: usize) -> Self {
        Self {
            models_dir: models_dir.as_ref().to_path_buf(),
            onnx_threads: onnx_threads.max(1),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn descriptor_path(&self, hazard: &Hazard) -> PathBuf {
        self.models_dir.join(format!("{}.json", hazard.as_str()))
    }

    /// Load the model for a single hazard
    pub fn load_model(&self, hazard: &Hazard) -> Result<Arc<dyn HazardModel>> {
        let path = self.descriptor_path(hazard);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read model descriptor {}", path.display()))?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid model descriptor {}", path.display()))?;

        self.build(hazard, artifact)
    }

    fn build(&self, hazard: &Hazard, artifact: ModelArtifact) -> Result<Arc<dyn HazardModel>> {
        let model: Arc<dyn HazardModel> = match artifact {
            ModelArtifact::Logistic {
                features,
                coefficients,
                intercept,
                classes,
            } => {
                let classes: [i64; 2] = classes.as_slice().try_into().map_err(|_| {
                    anyhow::anyhow!("logistic model needs exactly 2 classes, got {:?}", classes)
                })?;
                Arc::new(LogisticClassifier::new(features, coefficients, intercept, classes)?)
            }
            ModelArtifact::SingleClass { features, class } => {
                Arc::new(SingleClassClassifier::new(features, class))
            }
            ModelArtifact::Linear {
                features,
                coefficients,
                intercept,
            } => Arc::new(LinearRegressor::new(features, coefficients, intercept)),
            ModelArtifact::Onnx {
                path,
                features,
                classes,
            } => Arc::new(OnnxModel::load(
                self.models_dir.join(path),
                hazard.as_str(),
                features,
                classes,
                self.onnx_threads,
            )?),
        };
        Ok(model)
    }

    /// Load one model per hazard.
    ///
    /// A hazard whose model fails to load stays registered as unavailable so
    /// its outputs are marked undefined rather than omitted. Fails if no
    /// hazard loads.
    pub fn load_registry(&self, hazards: &[Hazard]) -> Result<ModelRegistry> {
        let mut models = Vec::with_capacity(hazards.len());
        let mut loaded = 0;

        for hazard in hazards {
            match self.load_model(hazard) {
                Ok(model) => {
                    info!(hazard = %hazard, family = model.family(), "Model loaded");
                    loaded += 1;
                    models.push((hazard.clone(), model));
                }
                Err(e) => {
                    warn!(hazard = %hazard, error = %format!("{e:#}"), "Failed to load model, hazard marked unavailable");
                    let model: Arc<dyn HazardModel> = Arc::new(UnavailableModel::new(format!("{e:#}")));
                    models.push((hazard.clone(), model));
                }
            }
        }

        if loaded == 0 {
            return Err(PipelineError::EmptyRegistry)
                .with_context(|| format!("No models loaded from {}", self.models_dir.display()));
        }

        info!(
            count = loaded,
            "Loaded {} of {} models from {}",
            loaded,
            hazards.len(),
            self.models_dir.display()
        );

        let registry = ModelRegistry::new(models)?.with_source(self.clone(), hazards.to_vec());
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_artifact_descriptors_parse() {
        let logistic: ModelArtifact = serde_json::from_str(
            r#"{"kind": "logistic", "features": ["rain_sum"], "coefficients": [0.2], "intercept": -1.0}"#,
        )
        .unwrap();
        assert!(matches!(logistic, ModelArtifact::Logistic { ref classes, .. } if classes == &vec![0, 1]));

        let single: ModelArtifact =
            serde_json::from_str(r#"{"kind": "single_class", "class": 0}"#).unwrap();
        assert_eq!(
            single,
            ModelArtifact::SingleClass {
                features: None,
                class: 0
            }
        );
    }

    #[test]
    fn test_load_registry_marks_failed_hazards_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "flood.json",
            r#"{"kind": "logistic", "coefficients": [0.1], "intercept": 0.0, "features": ["rain_sum"]}"#,
        );
        write(dir.path(), "storm.json", r#"{"kind": "single_class", "class": 1}"#);
        write(dir.path(), "rain.json", "not json");

        let hazards: Vec<Hazard> = ["flood", "rain", "storm", "landslide"]
            .into_iter()
            .map(Hazard::from)
            .collect();
        let registry = ModelLoader::new(dir.path()).load_registry(&hazards).unwrap();

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.available_count(), 2);
        assert_eq!(registry.hazards().cloned().collect::<Vec<_>>(), hazards);
        assert!(!registry.get(&Hazard::new("rain")).unwrap().is_available());
        assert!(!registry.get(&Hazard::new("landslide")).unwrap().is_available());
    }

    #[test]
    fn test_load_registry_fails_when_nothing_loads() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelLoader::new(dir.path())
            .load_registry(&[Hazard::new("flood")])
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::EmptyRegistry)
        );
    }

    #[test]
    fn test_onnx_descriptor_parses() {
        let onnx: ModelArtifact = serde_json::from_str(
            r#"{"kind": "onnx", "path": "flood.onnx", "features": ["rain_sum", "soil_moisture_mean"]}"#,
        )
        .unwrap();
        assert_eq!(
            onnx,
            ModelArtifact::Onnx {
                path: "flood.onnx".to_string(),
                features: vec!["rain_sum".to_string(), "soil_moisture_mean".to_string()],
                classes: vec![0, 1],
            }
        );

        // The graph alone carries no column names, so the schema is required.
        assert!(serde_json::from_str::<ModelArtifact>(r#"{"kind": "onnx", "path": "flood.onnx"}"#).is_err());
    }

    #[test]
    fn test_missing_onnx_graph_marks_hazard_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "flood.json",
            r#"{"kind": "onnx", "path": "flood.onnx", "features": ["rain_sum"]}"#,
        );
        write(dir.path(), "storm.json", r#"{"kind": "single_class", "class": 1}"#);

        let err = ModelLoader::new(dir.path())
            .load_model(&Hazard::new("flood"))
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("flood.onnx"));

        let registry = ModelLoader::new(dir.path())
            .load_registry(&[Hazard::new("flood"), Hazard::new("storm")])
            .unwrap();
        assert_eq!(registry.available_count(), 1);
        assert!(!registry.get(&Hazard::new("flood")).unwrap().is_available());
        assert!(registry.get(&Hazard::new("storm")).unwrap().is_available());
    }

    #[test]
    fn test_logistic_needs_two_classes() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "flood.json",
            r#"{"kind": "logistic", "coefficients": [0.1], "intercept": 0.0, "classes": [1]}"#,
        );
        assert!(ModelLoader::new(dir.path())
            .load_model(&Hazard::new("flood"))
            .is_err());
    }
}

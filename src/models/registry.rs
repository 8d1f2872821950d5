//! Registry of hazard models, built once at start-up

use crate::error::{PipelineError, PipelineResult};
use crate::models::loader::ModelLoader;
use crate::models::scorer::HazardModel;
use crate::types::hazard::Hazard;
use anyhow::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A hazard and the model that scores it
#[derive(Clone)]
pub struct RegisteredModel {
    pub hazard: Hazard,
    pub model: Arc<dyn HazardModel>,
}

/// Fixed, ordered set of hazard models.
///
/// The hazard list is explicit and immutable; models are shared read-only.
/// A changed model store is picked up with [`ModelRegistry::reload`], which
/// builds a new registry.
#[derive(Clone)]
pub struct ModelRegistry {
    entries: Vec<RegisteredModel>,
    source: Option<(ModelLoader, Vec<Hazard>)>,
}

impl ModelRegistry {
    /// Build a registry from `(hazard, model)` pairs, in output order.
    pub fn new(models: Vec<(Hazard, Arc<dyn HazardModel>)>) -> PipelineResult<Self> {
        if models.is_empty() {
            return Err(PipelineError::EmptyRegistry);
        }
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(models.len());
        for (hazard, model) in models {
            if !seen.insert(hazard.clone()) {
                return Err(PipelineError::DuplicateHazard(hazard.to_string()));
            }
            entries.push(RegisteredModel { hazard, model });
        }
        Ok(Self {
            entries,
            source: None,
        })
    }

    /// Remember where the registry came from so it can be reloaded.
    pub(crate) fn with_source(mut self, loader: ModelLoader, hazards: Vec<Hazard>) -> Self {
        self.source = Some((loader, hazards));
        self
    }

    pub fn hazards(&self) -> impl Iterator<Item = &Hazard> {
        self.entries.iter().map(|e| &e.hazard)
    }

    pub fn entries(&self) -> &[RegisteredModel] {
        &self.entries
    }

    pub fn get(&self, hazard: &Hazard) -> Option<&Arc<dyn HazardModel>> {
        self.entries
            .iter()
            .find(|e| &e.hazard == hazard)
            .map(|e| &e.model)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of hazards whose model loaded.
    pub fn available_count(&self) -> usize {
        self.entries.iter().filter(|e| e.model.is_available()).count()
    }

    /// Load a fresh registry from the same model store.
    pub fn reload(&self) -> Result<ModelRegistry> {
        match &self.source {
            Some((loader, hazards)) => loader.load_registry(hazards),
            None => anyhow::bail!("registry was not loaded from a model store"),
        }
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (e.hazard.as_str(), e.model.family())))
            .finish()
    }
}

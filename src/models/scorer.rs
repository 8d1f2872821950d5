//! Hazard model capability and the built-in model families.
//!
//! Every model, whatever produced it, is driven through [`HazardModel`]. The
//! variants the inference engine must tolerate (two-class classifiers,
//! classifiers that only ever saw one class, regressors with no probability
//! interface, models that failed to load) are adapters behind that trait.

use crate::models::alignment::FeatureMatrix;
use anyhow::{bail, ensure, Result};

/// Label of the positive (hazard occurs) class.
pub const POSITIVE_CLASS: i64 = 1;

/// Per-class probabilities for each row, columns ordered like `classes`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities {
    pub classes: Vec<i64>,
    pub rows: Vec<Vec<f64>>,
}

impl ClassProbabilities {
    /// Probability of the positive class for every row.
    ///
    /// A model that only knows one class cannot produce a two-column vector:
    /// its rows are 1.0 if that class is positive, else 0.0. When the positive
    /// label is absent from a multi-class output the last column is used.
    pub fn positive(&self) -> Result<Vec<f64>> {
        match self.classes.as_slice() {
            [] => bail!("model reports no classes"),
            [only] => {
                let p = if *only == POSITIVE_CLASS { 1.0 } else { 0.0 };
                Ok(vec![p; self.rows.len()])
            }
            classes => {
                let idx = classes
                    .iter()
                    .position(|&c| c == POSITIVE_CLASS)
                    .unwrap_or(classes.len() - 1);
                self.rows
                    .iter()
                    .enumerate()
                    .map(|(i, row)| {
                        ensure!(
                            row.len() == classes.len(),
                            "row {} has {} probabilities for {} classes",
                            i,
                            row.len(),
                            classes.len()
                        );
                        Ok(row[idx])
                    })
                    .collect()
            }
        }
    }
}

/// Everything one scoring pass yields for a batch of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// `None` for models without a probability interface
    pub probabilities: Option<ClassProbabilities>,
    pub predictions: Vec<f64>,
}

impl ModelOutput {
    /// Probability of the positive class for each row.
    ///
    /// Two-class models yield their positive column, single-class models a
    /// constant 1.0 or 0.0, and models without a probability interface their
    /// raw predicted output.
    pub fn positive_probability(&self) -> Result<Vec<f64>> {
        match &self.probabilities {
            Some(proba) => proba.positive(),
            None => Ok(self.predictions.clone()),
        }
    }
}

/// A pre-trained scoring model for one hazard.
///
/// Implementations are read-only once loaded and may be shared across
/// concurrent forecast cycles.
pub trait HazardModel: Send + Sync {
    /// Short model family name for logs.
    fn family(&self) -> &'static str;

    /// Ordered input schema, if the model declares one.
    fn feature_names(&self) -> Option<&[String]>;

    /// Per-class probabilities, or `Ok(None)` if the model has no probability
    /// interface.
    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Option<ClassProbabilities>>;

    /// Raw predicted output per row (class label or regression value).
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Probabilities and predictions together. Backends whose single pass
    /// produces both override this to avoid scoring twice.
    fn evaluate(&self, x: &FeatureMatrix) -> Result<ModelOutput> {
        Ok(ModelOutput {
            probabilities: self.predict_proba(x)?,
            predictions: self.predict(x)?,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn check_width(x: &FeatureMatrix, coefficients: &[f64]) -> Result<()> {
    ensure!(
        x.columns().len() == coefficients.len(),
        "model expects {} features, got {}",
        coefficients.len(),
        x.columns().len()
    );
    Ok(())
}

fn linear_terms(x: &FeatureMatrix, coefficients: &[f64], intercept: f64) -> Result<Vec<f64>> {
    check_width(x, coefficients)?;
    Ok((0..x.rows())
        .map(|i| {
            x.row(i)
                .iter()
                .zip(coefficients)
                .map(|(v, w)| v * w)
                .sum::<f64>()
                + intercept
        })
        .collect())
}

/// Two-class linear classifier with a logistic link.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticClassifier {
    features: Option<Vec<String>>,
    coefficients: Vec<f64>,
    intercept: f64,
    classes: [i64; 2],
}

impl LogisticClassifier {
    pub fn new(
        features: Option<Vec<String>>,
        coefficients: Vec<f64>,
        intercept: f64,
        classes: [i64; 2],
    ) -> Result<Self> {
        if let Some(names) = &features {
            ensure!(
                names.len() == coefficients.len(),
                "{} feature names for {} coefficients",
                names.len(),
                coefficients.len()
            );
        }
        Ok(Self {
            features,
            coefficients,
            intercept,
            classes,
        })
    }

    fn second_class_probability(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(linear_terms(x, &self.coefficients, self.intercept)?
            .into_iter()
            .map(|z| 1.0 / (1.0 + (-z).exp()))
            .collect())
    }
}

impl HazardModel for LogisticClassifier {
    fn family(&self) -> &'static str {
        "logistic"
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.features.as_deref()
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Option<ClassProbabilities>> {
        let rows = self
            .second_class_probability(x)?
            .into_iter()
            .map(|p| vec![1.0 - p, p])
            .collect();
        Ok(Some(ClassProbabilities {
            classes: self.classes.to_vec(),
            rows,
        }))
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(self
            .second_class_probability(x)?
            .into_iter()
            .map(|p| {
                let class = if p >= 0.5 { self.classes[1] } else { self.classes[0] };
                class as f64
            })
            .collect())
    }
}

/// Classifier trained on examples of a single class.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleClassClassifier {
    features: Option<Vec<String>>,
    class: i64,
}

impl SingleClassClassifier {
    pub fn new(features: Option<Vec<String>>, class: i64) -> Self {
        Self { features, class }
    }
}

impl HazardModel for SingleClassClassifier {
    fn family(&self) -> &'static str {
        "single_class"
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.features.as_deref()
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Option<ClassProbabilities>> {
        Ok(Some(ClassProbabilities {
            classes: vec![self.class],
            rows: vec![vec![1.0]; x.rows()],
        }))
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(vec![self.class as f64; x.rows()])
    }
}

/// Regression-style model without a probability interface.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegressor {
    features: Option<Vec<String>>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearRegressor {
    pub fn new(features: Option<Vec<String>>, coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            features,
            coefficients,
            intercept,
        }
    }
}

impl HazardModel for LinearRegressor {
    fn family(&self) -> &'static str {
        "linear"
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.features.as_deref()
    }

    fn predict_proba(&self, _x: &FeatureMatrix) -> Result<Option<ClassProbabilities>> {
        Ok(None)
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        linear_terms(x, &self.coefficients, self.intercept)
    }
}

/// Stand-in for a hazard whose model could not be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct UnavailableModel {
    reason: String,
}

impl UnavailableModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl HazardModel for UnavailableModel {
    fn family(&self) -> &'static str {
        "unavailable"
    }

    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    fn predict_proba(&self, _x: &FeatureMatrix) -> Result<Option<ClassProbabilities>> {
        bail!("model unavailable: {}", self.reason)
    }

    fn predict(&self, _x: &FeatureMatrix) -> Result<Vec<f64>> {
        bail!("model unavailable: {}", self.reason)
    }

    fn is_available(&self) -> bool {
        false
    }
}

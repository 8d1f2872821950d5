//! Aligning a feature table to a model's declared input schema.

use crate::types::table::FeatureTable;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Row-major model input with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, rows: usize, data: Vec<f64>) -> Result<Self> {
        anyhow::ensure!(
            data.len() == rows * columns.len(),
            "matrix data has {} values, expected {} x {}",
            data.len(),
            rows,
            columns.len()
        );
        Ok(Self {
            columns,
            rows,
            data,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let width = self.columns.len();
        &self.data[i * width..(i + 1) * width]
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some((0..self.rows).map(|i| self.row(i)[idx]).collect())
    }

    /// Values as `f32`, row-major, for tensor inputs.
    pub fn to_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&v| v as f32).collect()
    }

    /// Rewrite every value of the columns `lookup` returns parameters for.
    fn map_columns<T>(&mut self, lookup: impl Fn(&str) -> Option<T>, apply: impl Fn(&T, f64) -> f64) {
        let width = self.columns.len();
        for (idx, name) in self.columns.iter().enumerate() {
            if let Some(params) = lookup(name) {
                for row in 0..self.rows {
                    let v = &mut self.data[row * width + idx];
                    *v = apply(&params, *v);
                }
            }
        }
    }
}

/// Reduce or expand `features` to exactly `expected`, in that order.
///
/// Expected columns the table lacks are filled with 0; table columns not
/// expected are dropped. With no declared schema, every table column is used
/// in table order.
pub fn align(features: &FeatureTable, expected: Option<&[String]>) -> FeatureMatrix {
    let columns: Vec<String> = match expected {
        Some(names) => names.to_vec(),
        None => features.column_names().map(str::to_string).collect(),
    };

    let sources: Vec<Option<&[f64]>> = columns.iter().map(|c| features.column(c)).collect();
    let missing: Vec<&str> = columns
        .iter()
        .zip(&sources)
        .filter(|(_, s)| s.is_none())
        .map(|(c, _)| c.as_str())
        .collect();
    if !missing.is_empty() {
        debug!(missing = ?missing, "Expected features absent, filled with 0");
    }

    let rows = features.len();
    let mut data = Vec::with_capacity(rows * columns.len());
    for row in 0..rows {
        data.extend(sources.iter().map(|s| s.map_or(0.0, |values| values[row])));
    }

    FeatureMatrix {
        columns,
        rows,
        data,
    }
}

/// Per-feature `[min, max]` bounds applied to aligned inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipRanges(HashMap<String, (f64, f64)>);

impl ClipRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, feature: &str, min: f64, max: f64) -> Self {
        self.0.insert(feature.to_string(), (min, max));
        self
    }

    /// Load bounds from a JSON object of `"feature": [min, max]`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read clip ranges from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid clip ranges in {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Clamp every bounded column of `matrix`; unknown features are ignored.
    pub fn apply(&self, matrix: &mut FeatureMatrix) {
        matrix.map_columns(
            |name| {
                self.0
                    .get(name)
                    .map(|&(min, max)| if min <= max { (min, max) } else { (max, min) })
            },
            |&(lo, hi), v| v.clamp(lo, hi),
        );
    }
}

/// Standardization parameters for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    pub mean: f64,
    pub scale: f64,
}

/// Training-time standardization, `(x - mean) / scale`, for listed features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureScaler(HashMap<String, ScaleParams>);

impl FeatureScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, feature: &str, mean: f64, scale: f64) -> Self {
        self.0.insert(feature.to_string(), ScaleParams { mean, scale });
        self
    }

    /// Load parameters from a JSON object of `"feature": {"mean": .., "scale": ..}`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scaler from {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid scaler in {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn apply(&self, matrix: &mut FeatureMatrix) {
        matrix.map_columns(
            |name| self.0.get(name).copied(),
            |p, v| {
                let scale = if p.scale == 0.0 { 1.0 } else { p.scale };
                (v - p.mean) / scale
            },
        );
    }
}

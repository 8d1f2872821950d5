//! ONNX Runtime backed hazard models

use crate::models::alignment::FeatureMatrix;
use crate::models::scorer::{ClassProbabilities, HazardModel, ModelOutput, POSITIVE_CLASS};
use anyhow::{anyhow, bail, ensure, Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info};

static RUNTIME_READY: OnceLock<()> = OnceLock::new();

fn init_runtime() -> Result<()> {
    if RUNTIME_READY.get().is_none() {
        ort::init().commit()?;
        let _ = RUNTIME_READY.set(());
        info!("ONNX Runtime initialized");
    }
    Ok(())
}

/// Classifier exported to ONNX, e.g. a scikit-learn pipeline via skl2onnx.
///
/// Expects a float input of shape `[rows, features]`. Probabilities may come
/// as a `[rows, classes]` tensor, a single positive-class column (`[rows, 1]`
/// or `[rows]`), or a ZipMap `seq(map(int64, float))`. A `label` output is
/// used for predictions when present.
pub struct OnnxModel {
    name: String,
    /// Session runs need exclusive access; the model itself is never mutated
    session: Mutex<Session>,
    input_name: String,
    probability_output: String,
    label_output: Option<String>,
    features: Vec<String>,
    classes: Vec<i64>,
}

impl OnnxModel {
    /// Load an ONNX graph from file
    pub fn load<P: AsRef<Path>>(
        path: P,
        name: &str,
        features: Vec<String>,
        classes: Vec<i64>,
        onnx_threads: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        ensure!(path.is_file(), "model file {} not found", path.display());
        init_runtime()?;

        info!(model = %name, path = %path.display(), threads = onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let probability_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone());

        info!(
            model = %name,
            input = %input_name,
            output = %probability_output,
            "Model loaded successfully"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            probability_output,
            label_output,
            features,
            classes,
        })
    }

    /// One session run yielding probabilities and, if exported, labels.
    fn run(&self, x: &FeatureMatrix) -> Result<ModelOutput> {
        ensure!(
            x.columns().len() == self.features.len(),
            "model `{}` expects {} features, got {}",
            self.name,
            self.features.len(),
            x.columns().len()
        );

        let shape = vec![x.rows() as i64, x.columns().len() as i64];
        let input_tensor =
            Tensor::from_array((shape, x.to_f32())).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("Lock error: {}", e))?;
        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;

        let output = outputs
            .get(self.probability_output.as_str())
            .ok_or_else(|| anyhow!("output `{}` missing", self.probability_output))?;

        // Tensor outputs (logistic, tree ensembles) first, then ZipMap seq(map)
        let probabilities = if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            probabilities_from_tensor(&dims, data, x.rows(), &self.classes)?
        } else if DynSequenceValueType::can_downcast(&output.dtype()) {
            let maps = extract_sequence_maps(output)?;
            debug!(model = %self.name, rows = maps.len(), "Extracted from seq(map)");
            probabilities_from_maps(&maps, x.rows(), &self.classes)?
        } else {
            bail!(
                "output `{}` is neither a float tensor nor a sequence of maps",
                self.probability_output
            );
        };

        let predictions = match self.label_output.as_deref().and_then(|n| outputs.get(n)) {
            Some(value) => {
                let (_, labels) = value.try_extract_tensor::<i64>()?;
                labels.iter().map(|&l| l as f64).collect()
            }
            None => most_probable(&probabilities)?,
        };

        Ok(ModelOutput {
            probabilities: Some(probabilities),
            predictions,
        })
    }
}

impl HazardModel for OnnxModel {
    fn family(&self) -> &'static str {
        "onnx"
    }

    fn feature_names(&self) -> Option<&[String]> {
        Some(&self.features)
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Option<ClassProbabilities>> {
        Ok(self.run(x)?.probabilities)
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(self.run(x)?.predictions)
    }

    fn evaluate(&self, x: &FeatureMatrix) -> Result<ModelOutput> {
        self.run(x)
    }
}

/// Key/value pairs of every map in a `seq(map(int64, float))` output.
fn extract_sequence_maps(output: &DynValue) -> Result<Vec<Vec<(i64, f32)>>> {
    let allocator = Allocator::default();
    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

    let mut rows = Vec::with_capacity(maps.len());
    for map_value in &maps {
        let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;
        rows.push(kv_pairs.into_iter().collect());
    }
    Ok(rows)
}

/// Decode a float probability tensor.
///
/// `[rows, classes]` keeps one column per class, labelled by `classes` when
/// the widths agree and by column index otherwise. `[rows, 1]` and `[rows]`
/// carry the positive-class probability alone.
pub fn probabilities_from_tensor(
    dims: &[i64],
    data: &[f32],
    rows: usize,
    classes: &[i64],
) -> Result<ClassProbabilities> {
    let width = match dims {
        [n] if *n as usize == rows => 1,
        [n, width] if *n as usize == rows && *width > 0 => *width as usize,
        _ => bail!("unexpected probability shape {:?} for {} rows", dims, rows),
    };
    ensure!(
        data.len() == rows * width,
        "probability tensor holds {} values, expected {}",
        data.len(),
        rows * width
    );

    if width == 1 {
        return Ok(ClassProbabilities {
            classes: vec![1 - POSITIVE_CLASS, POSITIVE_CLASS],
            rows: data.iter().map(|&p| vec![1.0 - p as f64, p as f64]).collect(),
        });
    }

    let classes = if classes.len() == width {
        classes.to_vec()
    } else {
        (0..width as i64).collect()
    };
    Ok(ClassProbabilities {
        classes,
        rows: data
            .chunks(width)
            .map(|row| row.iter().map(|&p| p as f64).collect())
            .collect(),
    })
}

/// Decode ZipMap output, one `class -> probability` map per row.
///
/// Classes are the sorted keys of the first map; every map must carry them
/// all. An empty batch keeps the declared `classes`.
pub fn probabilities_from_maps(
    maps: &[Vec<(i64, f32)>],
    rows: usize,
    classes: &[i64],
) -> Result<ClassProbabilities> {
    ensure!(
        maps.len() == rows,
        "probability sequence holds {} maps for {} rows",
        maps.len(),
        rows
    );

    let classes: Vec<i64> = match maps.first() {
        Some(first) => {
            let mut keys: Vec<i64> = first.iter().map(|(class, _)| *class).collect();
            keys.sort_unstable();
            keys.dedup();
            keys
        }
        None => classes.to_vec(),
    };

    let rows = maps
        .iter()
        .enumerate()
        .map(|(i, map)| {
            classes
                .iter()
                .map(|class| {
                    map.iter()
                        .find(|(c, _)| c == class)
                        .map(|(_, p)| *p as f64)
                        .ok_or_else(|| anyhow!("row {} has no probability for class {}", i, class))
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ClassProbabilities { classes, rows })
}

/// Label of the most probable class in each row.
fn most_probable(proba: &ClassProbabilities) -> Result<Vec<f64>> {
    proba
        .rows
        .iter()
        .map(|row| {
            let best = row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .ok_or_else(|| anyhow!("empty probability row"))?;
            proba
                .classes
                .get(best)
                .map(|&c| c as f64)
                .ok_or_else(|| anyhow!("class index {} out of range", best))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_column_tensor() {
        let proba = probabilities_from_tensor(&[2, 2], &[0.8, 0.2, 0.25, 0.75], 2, &[0, 1]).unwrap();
        assert_eq!(proba.classes, vec![0, 1]);
        assert_eq!(proba.positive().unwrap(), vec![0.2f32 as f64, 0.75]);
        assert_eq!(most_probable(&proba).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_declared_classes_relabel_columns() {
        let proba = probabilities_from_tensor(&[1, 2], &[0.75, 0.25], 1, &[1, 0]).unwrap();
        assert_eq!(proba.positive().unwrap(), vec![0.75]);

        // Width disagrees with the declared classes: label by column index.
        let proba = probabilities_from_tensor(&[1, 3], &[0.5, 0.25, 0.25], 1, &[0, 1]).unwrap();
        assert_eq!(proba.classes, vec![0, 1, 2]);
    }

    #[test]
    fn test_single_column_tensor_is_positive_probability() {
        for dims in [vec![3, 1], vec![3]] {
            let proba = probabilities_from_tensor(&dims, &[0.0, 0.5, 1.0], 3, &[0, 1]).unwrap();
            assert_eq!(proba.positive().unwrap(), vec![0.0, 0.5, 1.0], "{dims:?}");
            assert_eq!(proba.rows[1], vec![0.5, 0.5]);
        }
    }

    #[test]
    fn test_tensor_shape_must_match_rows() {
        assert!(probabilities_from_tensor(&[1, 2], &[0.5, 0.5], 2, &[0, 1]).is_err());
        assert!(probabilities_from_tensor(&[2, 2], &[0.5, 0.5], 2, &[0, 1]).is_err());
        assert!(probabilities_from_tensor(&[2, 2, 1], &[0.5; 4], 2, &[0, 1]).is_err());
    }

    #[test]
    fn test_zipmap_rows_ordered_by_class() {
        let maps = vec![vec![(1, 0.25), (0, 0.75)], vec![(0, 0.5), (1, 0.5)]];
        let proba = probabilities_from_maps(&maps, 2, &[0, 1]).unwrap();
        assert_eq!(proba.classes, vec![0, 1]);
        assert_eq!(proba.rows, vec![vec![0.75, 0.25], vec![0.5, 0.5]]);
        assert_eq!(proba.positive().unwrap(), vec![0.25, 0.5]);
    }

    #[test]
    fn test_zipmap_single_class_model() {
        let maps = vec![vec![(1, 1.0)]; 2];
        let proba = probabilities_from_maps(&maps, 2, &[0, 1]).unwrap();
        assert_eq!(proba.positive().unwrap(), vec![1.0; 2]);
    }

    #[test]
    fn test_zipmap_missing_class_or_row_fails() {
        let maps = vec![vec![(0, 0.5), (1, 0.5)], vec![(0, 1.0)]];
        let err = probabilities_from_maps(&maps, 2, &[0, 1]).unwrap_err();
        assert!(err.to_string().contains("class 1"));

        let maps = vec![vec![(0, 0.5), (1, 0.5)]];
        assert!(probabilities_from_maps(&maps, 2, &[0, 1]).is_err());
    }

    #[test]
    fn test_missing_model_file_fails_before_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxModel::load(dir.path().join("flood.onnx"), "flood", vec![], vec![0, 1], 1)
            .err()
            .unwrap();
        assert!(err.to_string().contains("not found"));
    }
}

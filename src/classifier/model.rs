//! Serialized classifier formats.
//!
//! A checkpoint is a JSON document holding a list of binary classifiers:
//!
//! ```json
//! {"models": [
//!   {"kind": "catboost", "oblivious_trees": [...], "scale_and_bias": [1.0, [0.0]]},
//!   {"kind": "logistic", "coefficients": [0.4, -0.1, -0.2, 0.0, -0.01], "intercept": 0.3}
//! ]}
//! ```
//!
//! The `catboost` layout follows CatBoost's own JSON model export, so
//! exported models load without conversion.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A binary classifier scoring one feature row.
pub trait ProbabilisticModel {
    /// Probability of the positive class.
    fn predict_proba(&self, row: &[f64]) -> f64;
}

/// Collection of models whose probabilities are averaged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub models: Vec<ClassifierModel>,
}

impl Checkpoint {
    /// Load a checkpoint from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| Error::ModelUnavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_slice(&data)
    }

    /// Parse a checkpoint from JSON bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let checkpoint: Checkpoint = serde_json::from_slice(data)
            .map_err(|e| Error::ModelUnavailable(format!("invalid checkpoint: {}", e)))?;
        if checkpoint.models.is_empty() {
            return Err(Error::ModelUnavailable("checkpoint holds no models".to_string()));
        }
        Ok(checkpoint)
    }
}

/// One serialized model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierModel {
    Catboost(ObliviousForest),
    Logistic(LogisticModel),
}

impl ProbabilisticModel for ClassifierModel {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        match self {
            ClassifierModel::Catboost(model) => model.predict_proba(row),
            ClassifierModel::Logistic(model) => model.predict_proba(row),
        }
    }
}

/// Gradient boosted oblivious decision trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObliviousForest {
    pub oblivious_trees: Vec<ObliviousTree>,
    /// `[scale, [bias]]`
    #[serde(default = "default_scale_and_bias")]
    pub scale_and_bias: (f64, Vec<f64>),
}

fn default_scale_and_bias() -> (f64, Vec<f64>) {
    (1.0, vec![0.0])
}

/// A symmetric tree: every level applies the same split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObliviousTree {
    pub splits: Vec<FloatSplit>,
    /// `2^depth` values, indexed by the split outcomes (first split is bit 0).
    pub leaf_values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatSplit {
    pub float_feature_index: usize,
    pub border: f64,
}

impl ObliviousTree {
    fn leaf(&self, row: &[f64]) -> f64 {
        let index = self
            .splits
            .iter()
            .enumerate()
            .fold(0usize, |acc, (bit, split)| {
                let value = row.get(split.float_feature_index).copied().unwrap_or(0.0);
                if value > split.border {
                    acc | (1 << bit)
                } else {
                    acc
                }
            });
        self.leaf_values.get(index).copied().unwrap_or(0.0)
    }
}

impl ProbabilisticModel for ObliviousForest {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        let raw: f64 = self.oblivious_trees.iter().map(|t| t.leaf(row)).sum();
        let (scale, ref bias) = self.scale_and_bias;
        sigmoid(raw * scale + bias.first().copied().unwrap_or(0.0))
    }
}

/// Linear model with a logistic link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl ProbabilisticModel for LogisticModel {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        let z: f64 = self
            .coefficients
            .iter()
            .zip(row)
            .map(|(c, x)| c * x)
            .sum::<f64>()
            + self.intercept;
        sigmoid(z)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

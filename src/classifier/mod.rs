//! Title classification over first-page block features.

mod model;

pub use model::{
    Checkpoint, ClassifierModel, FloatSplit, LogisticModel, ObliviousForest, ObliviousTree,
    ProbabilisticModel,
};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::FeatureTable;
use crate::model::TextBlock;

/// The block selected as the document title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleCandidate {
    /// Trimmed block text, line breaks turned into spaces.
    pub text: String,
    /// Mean probability over all models.
    pub confidence: f64,
    /// Index of the block in the classified input.
    pub block_index: usize,
    /// Mean probability of every block, in input order.
    pub scores: Vec<f64>,
}

/// Ensemble of binary title classifiers.
pub struct TitleClassifier<M: ProbabilisticModel = ClassifierModel> {
    models: Vec<M>,
}

impl TitleClassifier<ClassifierModel> {
    /// Load the ensemble from a checkpoint file.
    pub fn from_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self> {
        let checkpoint = Checkpoint::load(path)?;
        log::debug!("Loaded {} classifier models", checkpoint.models.len());
        Ok(Self {
            models: checkpoint.models,
        })
    }
}

impl<M: ProbabilisticModel> TitleClassifier<M> {
    /// Build a classifier from already-loaded models.
    pub fn new(models: Vec<M>) -> Result<Self> {
        if models.is_empty() {
            return Err(Error::ModelUnavailable("no models given".to_string()));
        }
        Ok(Self { models })
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Mean positive-class probability of every row.
    pub fn score(&self, features: &FeatureTable) -> Vec<f64> {
        features
            .matrix()
            .iter()
            .map(|row| {
                let total: f64 = self.models.iter().map(|m| m.predict_proba(row)).sum();
                total / self.models.len() as f64
            })
            .collect()
    }

    /// Pick the most probable title block. Ties keep the earliest block.
    pub fn classify(&self, blocks: &[TextBlock], features: &FeatureTable) -> Result<TitleCandidate> {
        if blocks.is_empty() || blocks.len() != features.len() {
            return Err(Error::Other(format!(
                "cannot classify {} blocks with {} feature rows",
                blocks.len(),
                features.len()
            )));
        }

        let scores = self.score(features);
        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }

        let candidate = TitleCandidate {
            text: blocks[best].title_text(),
            confidence: scores[best],
            block_index: best,
            scores,
        };
        log::info!(
            "Title candidate {:?} (block {}, confidence {:.3})",
            candidate.text,
            candidate.block_index,
            candidate.confidence
        );
        Ok(candidate)
    }
}

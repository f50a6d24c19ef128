//! Model training
//!
//! Split, scale, fit the classifier families and pick the best one.

pub mod boosting;
pub mod forest;
pub mod metrics;
pub mod model;
pub mod scaler;
pub mod split;
pub mod trainer;
pub mod tree;

pub use boosting::{BoostedClassifier, BoostingConfig};
pub use forest::{ForestConfig, RandomForest};
pub use metrics::{accuracy, ClassMetrics, ClassificationReport};
pub use model::{Classifier, FittedModel, ModelFamily};
pub use scaler::StandardScaler;
pub use split::TrainTestSplit;
pub use trainer::{train, train_with, ModelRegistry, TrainedModel, TrainingConfig};

use crate::error::{PredictorError, Result};

/// Sorted class labels and their dense indices
pub(crate) struct ClassIndex {
    classes: Vec<u8>,
}

impl ClassIndex {
    pub(crate) fn fit(labels: &[u8]) -> Self {
        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        Self { classes }
    }

    pub(crate) fn len(&self) -> usize {
        self.classes.len()
    }

    pub(crate) fn encode(&self, labels: &[u8]) -> Vec<usize> {
        labels
            .iter()
            .map(|l| self.classes.binary_search(l).unwrap_or(0))
            .collect()
    }

    pub(crate) fn into_classes(self) -> Vec<u8> {
        self.classes
    }
}

/// Shared shape checks before any family fits; returns the feature width
pub(crate) fn check_training_input(name: &str, x: &[Vec<f64>], labels: &[u8]) -> Result<usize> {
    let width = match x.first() {
        Some(row) if !row.is_empty() => row.len(),
        _ => return Err(PredictorError::fit_failure(name, "empty feature matrix")),
    };
    if x.len() != labels.len() {
        return Err(PredictorError::fit_failure(
            name,
            format!("{} feature rows but {} labels", x.len(), labels.len()),
        ));
    }
    if x.iter().any(|r| r.len() != width) {
        return Err(PredictorError::fit_failure(name, "feature rows have inconsistent widths"));
    }
    if x.iter().flatten().any(|v| !v.is_finite()) {
        return Err(PredictorError::fit_failure(name, "non-finite feature value"));
    }
    if ClassIndex::fit(labels).len() < 2 {
        return Err(PredictorError::fit_failure(
            name,
            "training split holds a single class",
        ));
    }
    Ok(width)
}

//! Classifier interface and fitted model variants

use serde::{Deserialize, Serialize};

use super::boosting::BoostedClassifier;
use super::forest::RandomForest;

/// A fitted finishing-position classifier over scaled feature rows
pub trait Classifier {
    /// Class labels in probability order
    fn classes(&self) -> &[u8];

    /// Most likely finishing position
    fn predict(&self, row: &[f64]) -> u8;

    /// Class probabilities aligned with `classes()`, if the model exposes them
    fn predict_proba(&self, row: &[f64]) -> Option<Vec<f64>>;
}

/// Classifier families trained on every run, in training order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    RandomForest,
    RegularizedBoosting,
    GradientBoosting,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 3] = [
        ModelFamily::RandomForest,
        ModelFamily::RegularizedBoosting,
        ModelFamily::GradientBoosting,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "Random Forest",
            ModelFamily::RegularizedBoosting => "Regularized Boosting",
            ModelFamily::GradientBoosting => "Gradient Boosting",
        }
    }
}

/// Index of the largest value; first wins on ties
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Forest(RandomForest),
    Boosted(BoostedClassifier),
}

impl FittedModel {
    pub fn n_features(&self) -> usize {
        match self {
            FittedModel::Forest(m) => m.n_features,
            FittedModel::Boosted(m) => m.n_features,
        }
    }

    /// Check a deserialized model against the scaler width it will be fed
    pub fn validate(&self, width: usize) -> Result<(), String> {
        if self.n_features() != width {
            return Err(format!(
                "model expects {} features, scaler provides {}",
                self.n_features(),
                width
            ));
        }
        let classes = self.classes();
        if classes.is_empty() || classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err("class labels must be non-empty and strictly increasing".to_string());
        }
        if self.feature_importances().len() != width {
            return Err(format!(
                "{} importances for {} features",
                self.feature_importances().len(),
                width
            ));
        }
        match self {
            FittedModel::Forest(m) => m.validate(),
            FittedModel::Boosted(m) => m.validate(),
        }
    }

    /// Normalized impurity (forest) or gain (boosting) importances
    pub fn feature_importances(&self) -> &[f64] {
        match self {
            FittedModel::Forest(m) => &m.feature_importances,
            FittedModel::Boosted(m) => &m.feature_importances,
        }
    }

    fn probabilities(&self, row: &[f64]) -> Vec<f64> {
        match self {
            FittedModel::Forest(m) => m.predict_proba(row),
            FittedModel::Boosted(m) => m.predict_proba(row),
        }
    }
}

impl Classifier for FittedModel {
    fn classes(&self) -> &[u8] {
        match self {
            FittedModel::Forest(m) => &m.classes,
            FittedModel::Boosted(m) => &m.classes,
        }
    }

    fn predict(&self, row: &[f64]) -> u8 {
        let probs = self.probabilities(row);
        self.classes()[argmax(&probs)]
    }

    fn predict_proba(&self, row: &[f64]) -> Option<Vec<f64>> {
        Some(self.probabilities(row))
    }
}

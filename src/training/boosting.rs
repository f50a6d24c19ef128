//! Boosted tree classifier
//!
//! Multiclass softmax boosting with second-order leaf weights. Each round
//! fits one regression tree per class on the softmax gradients `p - y` and
//! hessians `p(1 - p)`. Raw scores start from the log class priors.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{
    fit_gradient_tree, normalize_importances, DecisionTree, GradientTreeParams, PresortedFeatures,
};
use super::{check_training_input, ClassIndex};
use crate::error::{PredictorError, Result};

const MIN_HESSIAN: f64 = 1e-16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// L2 penalty on leaf weights
    pub lambda: f64,
    /// Minimum hessian sum in each child of a split
    pub min_child_weight: f64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self::regularized()
    }
}

impl BoostingConfig {
    /// Primary boosted family
    pub fn regularized() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            lambda: 1.0,
            min_child_weight: 1.0,
        }
    }

    /// Unregularized comparison family
    pub fn comparison() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            lambda: 0.0,
            min_child_weight: 0.0,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PredictorError::fit_failure(name, "n_estimators must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PredictorError::fit_failure(
                name,
                format!("learning_rate must be positive, got {}", self.learning_rate),
            ));
        }
        if self.max_depth == 0 {
            return Err(PredictorError::fit_failure(name, "max_depth must be at least 1"));
        }
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return Err(PredictorError::fit_failure(
                name,
                format!("lambda must be non-negative, got {}", self.lambda),
            ));
        }
        if !(self.min_child_weight >= 0.0 && self.min_child_weight.is_finite()) {
            return Err(PredictorError::fit_failure(
                name,
                format!("min_child_weight must be non-negative, got {}", self.min_child_weight),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedClassifier {
    pub classes: Vec<u8>,
    pub n_features: usize,
    pub learning_rate: f64,
    pub base_scores: Vec<f64>,
    /// `rounds[r][k]` is the round-`r` tree for class `k`
    pub rounds: Vec<Vec<DecisionTree>>,
    pub feature_importances: Vec<f64>,
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

impl BoostedClassifier {
    pub fn fit(name: &str, x: &[Vec<f64>], labels: &[u8], config: &BoostingConfig) -> Result<Self> {
        let width = check_training_input(name, x, labels)?;
        config.validate(name)?;

        let index = ClassIndex::fit(labels);
        let y = index.encode(labels);
        let n_classes = index.len();
        let n = x.len();

        let mut priors = vec![0.0; n_classes];
        for &k in &y {
            priors[k] += 1.0;
        }
        let base_scores: Vec<f64> = priors.iter().map(|c| (c / n as f64).ln()).collect();

        let params = GradientTreeParams {
            max_depth: config.max_depth,
            lambda: config.lambda,
            min_child_weight: config.min_child_weight,
        };
        let presorted = PresortedFeatures::new(x);

        let mut scores: Vec<Vec<f64>> = vec![base_scores.clone(); n];
        let mut rounds = Vec::with_capacity(config.n_estimators);
        let mut importances = vec![0.0; width];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];

        for round in 0..config.n_estimators {
            let probs: Vec<Vec<f64>> = scores.iter().map(|s| softmax(s)).collect();
            let mut trees = Vec::with_capacity(n_classes);

            for k in 0..n_classes {
                for i in 0..n {
                    let p = probs[i][k];
                    let target = if y[i] == k { 1.0 } else { 0.0 };
                    grad[i] = p - target;
                    hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
                }

                let (tree, gains) = fit_gradient_tree(x, &grad, &hess, &presorted, &params);
                for (total, g) in importances.iter_mut().zip(&gains) {
                    *total += g;
                }
                for (i, row) in x.iter().enumerate() {
                    scores[i][k] += config.learning_rate * tree.leaf_value(row)[0];
                }
                trees.push(tree);
            }
            rounds.push(trees);

            let loss = log_loss(&scores, &y);
            if !loss.is_finite() {
                return Err(PredictorError::fit_failure(
                    name,
                    format!("training loss became non-finite at round {}", round + 1),
                ));
            }
            if (round + 1) % 25 == 0 {
                debug!("{}: round {} log loss {:.5}", name, round + 1, loss);
            }
        }

        normalize_importances(&mut importances);

        Ok(Self {
            classes: index.into_classes(),
            n_features: width,
            learning_rate: config.learning_rate,
            base_scores,
            rounds,
            feature_importances: importances,
        })
    }

    /// Structural check for a deserialized booster
    pub fn validate(&self) -> std::result::Result<(), String> {
        let k = self.classes.len();
        if self.base_scores.len() != k {
            return Err(format!(
                "{} base scores for {} classes",
                self.base_scores.len(),
                k
            ));
        }
        if !self.learning_rate.is_finite() || self.base_scores.iter().any(|s| !s.is_finite()) {
            return Err("non-finite learning rate or base score".to_string());
        }
        for (r, trees) in self.rounds.iter().enumerate() {
            if trees.len() != k {
                return Err(format!("round {} has {} trees for {} classes", r, trees.len(), k));
            }
            for (c, tree) in trees.iter().enumerate() {
                tree.validate(self.n_features, 1)
                    .map_err(|reason| format!("round {} class {}: {}", r, c, reason))?;
            }
        }
        Ok(())
    }

    pub fn raw_scores(&self, row: &[f64]) -> Vec<f64> {
        let mut scores = self.base_scores.clone();
        for trees in &self.rounds {
            for (s, tree) in scores.iter_mut().zip(trees) {
                *s += self.learning_rate * tree.leaf_value(row)[0];
            }
        }
        scores
    }

    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        softmax(&self.raw_scores(row))
    }
}

/// Mean negative log-likelihood of the true classes
fn log_loss(scores: &[Vec<f64>], y: &[usize]) -> f64 {
    let total: f64 = scores
        .iter()
        .zip(y)
        .map(|(s, &k)| -softmax(s)[k].ln())
        .sum();
    total / y.len() as f64
}

//! Random forest classifier
//!
//! Bagged CART trees with gini impurity. Tree `i` draws its bootstrap sample
//! and split features from `StdRng::seed_from_u64(seed + i)`, trees are fit in
//! parallel and collected in index order, so the fitted forest does not depend
//! on thread scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{fit_classification_tree, normalize_importances, ClassificationTreeParams, DecisionTree};
use super::{check_training_input, ClassIndex};
use crate::error::{PredictorError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
    /// Unlimited when `None`
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features drawn per split; `floor(sqrt(width))` when `None`
    pub max_features: Option<usize>,
    pub bootstrap: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            bootstrap: true,
        }
    }
}

impl ForestConfig {
    fn validate(&self, name: &str, width: usize) -> Result<usize> {
        if self.n_estimators == 0 {
            return Err(PredictorError::fit_failure(name, "n_estimators must be at least 1"));
        }
        if self.min_samples_split < 2 {
            return Err(PredictorError::fit_failure(
                name,
                "min_samples_split must be at least 2",
            ));
        }
        if self.max_depth == Some(0) {
            return Err(PredictorError::fit_failure(name, "max_depth must be at least 1"));
        }
        let max_features = self
            .max_features
            .unwrap_or_else(|| ((width as f64).sqrt() as usize).max(1));
        if max_features == 0 || max_features > width {
            return Err(PredictorError::fit_failure(
                name,
                format!("max_features must be in 1..={}, got {}", width, max_features),
            ));
        }
        Ok(max_features)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub classes: Vec<u8>,
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
    pub feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(
        name: &str,
        x: &[Vec<f64>],
        labels: &[u8],
        config: &ForestConfig,
        seed: u64,
    ) -> Result<Self> {
        let width = check_training_input(name, x, labels)?;
        let max_features = config.validate(name, width)?;
        let index = ClassIndex::fit(labels);
        let y = index.encode(labels);
        let n_classes = index.len();
        let n = x.len();

        let params = ClassificationTreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            max_features,
        };

        let fitted: Vec<(DecisionTree, Vec<f64>)> = (0..config.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                let samples: Vec<usize> = if config.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let (tree, mut importances) =
                    fit_classification_tree(x, &y, n_classes, samples, &params, &mut rng);
                normalize_importances(&mut importances);
                (tree, importances)
            })
            .collect();

        let mut feature_importances = vec![0.0; width];
        for (_, importances) in &fitted {
            for (total, v) in feature_importances.iter_mut().zip(importances) {
                *total += v;
            }
        }
        normalize_importances(&mut feature_importances);

        let trees: Vec<DecisionTree> = fitted.into_iter().map(|(tree, _)| tree).collect();
        debug!(
            "{}: fit {} trees over {} rows, {} classes",
            name,
            trees.len(),
            n,
            n_classes
        );

        Ok(Self {
            classes: index.into_classes(),
            n_features: width,
            trees,
            feature_importances,
        })
    }

    /// Structural check for a deserialized forest
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.classes.len())
                .map_err(|reason| format!("tree {}: {}", i, reason))?;
        }
        Ok(())
    }

    /// Mean of the per-tree leaf class distributions
    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut probs = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (p, v) in probs.iter_mut().zip(tree.leaf_value(row)) {
                *p += v;
            }
        }
        let n = self.trees.len().max(1) as f64;
        probs.iter_mut().for_each(|p| *p /= n);
        probs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let jitter = (i % 5) as f64 * 0.1;
            x.push(vec![1.0 + jitter, 5.0 - jitter]);
            y.push(1);
            x.push(vec![4.0 + jitter, 2.0 + jitter]);
            y.push(2);
            x.push(vec![8.0 - jitter, 9.0 + jitter]);
            y.push(3);
        }
        (x, y)
    }

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_estimators: 10,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_forest_learns_clusters() {
        let (x, y) = clustered();
        let forest = RandomForest::fit("Random Forest", &x, &y, &small_config(), 42).unwrap();

        assert_eq!(forest.classes, vec![1, 2, 3]);
        assert_eq!(forest.trees.len(), 10);

        let p = forest.predict_proba(&[1.1, 4.9]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(p[0] > 0.5);
        let p = forest.predict_proba(&[7.9, 9.1]);
        assert!(p[2] > 0.5);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = clustered();
        let a = RandomForest::fit("Random Forest", &x, &y, &small_config(), 7).unwrap();
        let b = RandomForest::fit("Random Forest", &x, &y, &small_config(), 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_importances_are_normalized() {
        let (x, y) = clustered();
        let forest = RandomForest::fit("Random Forest", &x, &y, &small_config(), 42).unwrap();
        let total: f64 = forest.feature_importances.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config_is_fit_failure() {
        let (x, y) = clustered();
        let config = ForestConfig {
            n_estimators: 0,
            ..ForestConfig::default()
        };
        let err = RandomForest::fit("Random Forest", &x, &y, &config, 42).unwrap_err();
        assert_eq!(err.kind(), "model_fit_failure");

        let config = ForestConfig {
            max_features: Some(5),
            ..ForestConfig::default()
        };
        assert!(RandomForest::fit("Random Forest", &x, &y, &config, 42).is_err());
    }

    #[test]
    fn test_single_class_is_fit_failure() {
        let x = vec![vec![1.0], vec![2.0]];
        let err = RandomForest::fit("Random Forest", &x, &[4, 4], &small_config(), 42).unwrap_err();
        assert_eq!(err.kind(), "model_fit_failure");
    }
}

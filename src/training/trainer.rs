//! Multi-model trainer
//!
//! Splits and scales the feature matrix once, fits every classifier family
//! on the same scaled training rows, scores each on the held-out rows and
//! designates the most accurate one. A family that fails to fit is logged
//! and left out of the registry.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::boosting::{BoostedClassifier, BoostingConfig};
use super::forest::{ForestConfig, RandomForest};
use super::metrics::{accuracy, ClassificationReport};
use super::model::{Classifier, FittedModel, ModelFamily};
use super::scaler::StandardScaler;
use super::split::TrainTestSplit;
use super::ClassIndex;
use crate::config::PipelineConfig;
use crate::error::{PredictorError, Result};
use crate::models::ModelSummary;

/// Hyperparameters for each family
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub random_forest: ForestConfig,
    pub regularized_boosting: BoostingConfig,
    pub gradient_boosting: BoostingConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            random_forest: ForestConfig::default(),
            regularized_boosting: BoostingConfig::regularized(),
            gradient_boosting: BoostingConfig::comparison(),
        }
    }
}

impl From<&PipelineConfig> for TrainingConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            random_forest: config.random_forest.clone(),
            regularized_boosting: config.regularized_boosting.clone(),
            gradient_boosting: config.gradient_boosting.clone(),
        }
    }
}

/// One fitted family with its held-out evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub name: String,
    pub family: ModelFamily,
    pub model: FittedModel,
    pub scaler: StandardScaler,
    pub accuracy: f64,
    pub report: ClassificationReport,
}

/// Trained families in training order plus the designated best model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRegistry {
    models: Vec<TrainedModel>,
    best: usize,
}

impl ModelRegistry {
    /// Assemble a registry, designating `best_name`
    pub fn from_models(models: Vec<TrainedModel>, best_name: &str) -> Result<Self> {
        let best = models
            .iter()
            .position(|m| m.name == best_name)
            .ok_or_else(|| {
                PredictorError::InsufficientData(format!(
                    "best model {:?} is not in the registry",
                    best_name
                ))
            })?;
        Ok(Self { models, best })
    }

    pub fn best(&self) -> &TrainedModel {
        &self.models[self.best]
    }

    pub fn best_name(&self) -> &str {
        &self.best().name
    }

    pub fn get(&self, name: &str) -> Option<&TrainedModel> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn models(&self) -> &[TrainedModel] {
        &self.models
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn summaries(&self) -> Vec<ModelSummary> {
        self.models
            .iter()
            .enumerate()
            .map(|(i, m)| ModelSummary {
                name: m.name.clone(),
                accuracy: m.accuracy,
                macro_f1: m.report.macro_f1,
                is_best: i == self.best,
            })
            .collect()
    }
}

/// Pick the strictly most accurate model; the earliest trained wins ties
pub fn select_best(accuracies: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, acc) in accuracies.iter().enumerate() {
        if best.map_or(true, |b| *acc > accuracies[b]) {
            best = Some(i);
        }
    }
    best
}

/// Train every family with default hyperparameters
pub fn train(
    features: &[Vec<f64>],
    labels: &[u8],
    test_fraction: f64,
    seed: u64,
) -> Result<ModelRegistry> {
    train_with(features, labels, test_fraction, seed, &TrainingConfig::default(), |_, _| {})
}

/// Train every family; `on_family` fires after each family with its fit outcome
pub fn train_with<F>(
    features: &[Vec<f64>],
    labels: &[u8],
    test_fraction: f64,
    seed: u64,
    config: &TrainingConfig,
    mut on_family: F,
) -> Result<ModelRegistry>
where
    F: FnMut(ModelFamily, bool),
{
    if labels.is_empty() {
        return Err(PredictorError::InsufficientData(
            "no labelled rows to train on".to_string(),
        ));
    }
    if features.len() != labels.len() {
        return Err(PredictorError::InvalidInput(format!(
            "{} feature rows but {} labels",
            features.len(),
            labels.len()
        )));
    }
    if ClassIndex::fit(labels).len() < 2 {
        return Err(PredictorError::InsufficientData(
            "labels hold a single finishing position".to_string(),
        ));
    }

    let split = TrainTestSplit::new(labels.len(), test_fraction, seed)?;
    let x_train = TrainTestSplit::select(features, &split.train);
    let y_train = TrainTestSplit::select(labels, &split.train);
    let x_test = TrainTestSplit::select(features, &split.test);
    let y_test = TrainTestSplit::select(labels, &split.test);
    info!(
        "Split {} rows into {} train / {} test",
        labels.len(),
        x_train.len(),
        x_test.len()
    );

    let scaler = StandardScaler::fit(&x_train)?;
    let x_train = scaler.transform(&x_train)?;
    let x_test = scaler.transform(&x_test)?;

    let mut models = Vec::with_capacity(ModelFamily::ALL.len());
    for family in ModelFamily::ALL {
        let name = family.display_name();
        info!("Training {}...", name);

        let fitted = match family {
            ModelFamily::RandomForest => {
                RandomForest::fit(name, &x_train, &y_train, &config.random_forest, seed)
                    .map(FittedModel::Forest)
            }
            ModelFamily::RegularizedBoosting => {
                BoostedClassifier::fit(name, &x_train, &y_train, &config.regularized_boosting)
                    .map(FittedModel::Boosted)
            }
            ModelFamily::GradientBoosting => {
                BoostedClassifier::fit(name, &x_train, &y_train, &config.gradient_boosting)
                    .map(FittedModel::Boosted)
            }
        };

        match fitted {
            Ok(model) => {
                let predicted: Vec<u8> = x_test.iter().map(|row| model.predict(row)).collect();
                let acc = accuracy(&y_test, &predicted);
                let report = ClassificationReport::from_predictions(&y_test, &predicted);
                info!(
                    "{} accuracy: {:.4} (macro F1 {:.4})",
                    name, acc, report.macro_f1
                );
                models.push(TrainedModel {
                    name: name.to_string(),
                    family,
                    model,
                    scaler: scaler.clone(),
                    accuracy: acc,
                    report,
                });
                on_family(family, true);
            }
            Err(e) => {
                warn!("Excluding {}: {}", name, e);
                on_family(family, false);
            }
        }
    }

    let accuracies: Vec<f64> = models.iter().map(|m| m.accuracy).collect();
    let best = select_best(&accuracies).ok_or_else(|| {
        PredictorError::InsufficientData("every model family failed to fit".to_string())
    })?;
    info!(
        "Best model: {} ({:.4})",
        models[best].name, models[best].accuracy
    );

    Ok(ModelRegistry { models, best })
}

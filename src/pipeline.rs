//! End-to-end training pipeline
//!
//! Load → derive features → fit encoding → impute → train → persist.

use std::path::Path;
use tracing::info;

use crate::config::{MissingValuePolicy, PipelineConfig};
use crate::data::csv_loader::load_results_csv;
use crate::data::encoding::{EncodedRow, FittedEncoding};
use crate::data::features::{FeatureEngineering, FEATURE_COLUMNS};
use crate::data::loader::{validate_results, SyntheticRaceGenerator};
use crate::data::transform::{ColumnMeans, FeatureTransform};
use crate::error::{PredictorError, Result};
use crate::models::RaceResult;
use crate::persistence::{self, RegistryManifest};
use crate::training::{train_with, ModelFamily, ModelRegistry, TrainTestSplit, TrainingConfig};

/// Model-ready matrix with the transform that produced it
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub transform: FeatureTransform,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
    /// Rows left out for lacking a classified finish
    pub unclassified: usize,
}

pub struct PipelineOutcome {
    pub registry: ModelRegistry,
    pub transform: FeatureTransform,
    pub manifest: RegistryManifest,
    pub unclassified: usize,
}

/// Read results from a CSV file, or generate the synthetic table
pub fn load_results(config: &PipelineConfig, data_path: Option<&Path>) -> Result<Vec<RaceResult>> {
    let results = match data_path {
        Some(path) => load_results_csv(path)?,
        None => {
            let results = SyntheticRaceGenerator::new(config.synthetic.clone()).load(config.seed);
            validate_results(&results)?;
            results
        }
    };
    info!("Loaded {} race results", results.len());
    Ok(results)
}

/// Derive, encode and impute the training matrix
pub fn prepare(results: &[RaceResult], config: &PipelineConfig) -> Result<PreparedData> {
    let rows = FeatureEngineering::derive(results);
    let encoding = FittedEncoding::fit(&rows)?;
    let encoded = encoding.encode_rows(&rows)?;

    let (labelled, unlabelled): (Vec<EncodedRow>, Vec<EncodedRow>) =
        encoded.into_iter().partition(|r| r.label.is_some());
    if !unlabelled.is_empty() {
        info!(
            "Excluding {} rows without a classified finish from training",
            unlabelled.len()
        );
    }
    if labelled.is_empty() {
        return Err(PredictorError::InsufficientData(
            "no rows with a classified finish".to_string(),
        ));
    }

    let width = FEATURE_COLUMNS.len();
    let imputation = match config.missing_values {
        MissingValuePolicy::FullDataset => {
            ColumnMeans::fit(labelled.iter().chain(unlabelled.iter()), width)
        }
        MissingValuePolicy::TrainOnly => {
            // Same split the trainer draws for this seed and row count
            let split = TrainTestSplit::new(labelled.len(), config.test_fraction, config.seed)?;
            ColumnMeans::fit(split.train.iter().map(|&i| &labelled[i]), width)
        }
    };

    let transform = FeatureTransform::new(encoding, imputation, config.missing_values);
    let features = transform.impute_rows(&labelled);
    let labels = labelled.iter().filter_map(|r| r.label).collect();

    Ok(PreparedData {
        transform,
        features,
        labels,
        unclassified: unlabelled.len(),
    })
}

/// Train on the given results and persist every artifact
pub fn run_on<F>(results: &[RaceResult], config: &PipelineConfig, on_family: F) -> Result<PipelineOutcome>
where
    F: FnMut(ModelFamily, bool),
{
    let prepared = prepare(results, config)?;
    info!(
        "Training on {} rows with {} features ({:?} imputation)",
        prepared.labels.len(),
        FEATURE_COLUMNS.len(),
        config.missing_values
    );

    let registry = train_with(
        &prepared.features,
        &prepared.labels,
        config.test_fraction,
        config.seed,
        &TrainingConfig::from(config),
        on_family,
    )?;

    let scaler = registry.best().scaler.clone();
    let manifest = persistence::save(&registry, &scaler, &config.model_dir)?;
    persistence::save_transform(&prepared.transform, &config.model_dir)?;

    Ok(PipelineOutcome {
        registry,
        transform: prepared.transform,
        manifest,
        unclassified: prepared.unclassified,
    })
}

/// Full run: load, train and persist
pub fn run(config: &PipelineConfig, data_path: Option<&Path>) -> Result<PipelineOutcome> {
    config.validate()?;
    let results = load_results(config, data_path)?;
    run_on(&results, config, |_, _| {})
}

//! Pipeline configuration
//!
//! Defaults mirror the reference training run (seed 42, 20% test split).
//! A JSON file can override any subset of fields; the model directory can
//! also come from the `F1_MODEL_DIR` environment variable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::loader::SyntheticConfig;
use crate::error::{validate_test_fraction, PredictorError, Result};
use crate::training::{BoostingConfig, ForestConfig};

/// Environment variable overriding the artifact directory
pub const MODEL_DIR_ENV: &str = "F1_MODEL_DIR";

const DEFAULT_MODEL_DIR: &str = "models/trained_models";

/// How remaining missing feature values are filled after derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Column means over every row, computed before the train/test split.
    /// Test-set statistics leak into training features.
    #[default]
    FullDataset,
    /// Column means over the training split only
    TrainOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub seed: u64,
    pub test_fraction: f64,
    pub model_dir: PathBuf,
    pub missing_values: MissingValuePolicy,
    pub synthetic: SyntheticConfig,
    pub random_forest: ForestConfig,
    pub regularized_boosting: BoostingConfig,
    pub gradient_boosting: BoostingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            missing_values: MissingValuePolicy::default(),
            synthetic: SyntheticConfig::default(),
            random_forest: ForestConfig::default(),
            regularized_boosting: BoostingConfig::regularized(),
            gradient_boosting: BoostingConfig::comparison(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            PredictorError::DataUnavailable(format!("config file {:?}: {}", path, e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
            if !dir.is_empty() {
                self.model_dir = PathBuf::from(dir);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_test_fraction(self.test_fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.seed, 42);
        assert!((config.test_fraction - 0.2).abs() < 1e-12);
        assert_eq!(config.missing_values, MissingValuePolicy::FullDataset);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"seed": 7, "missing_values": "train_only", "synthetic": {{"races": 12}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.missing_values, MissingValuePolicy::TrainOnly);
        assert_eq!(config.synthetic.races, 12);
        // Untouched fields keep defaults
        assert!((config.test_fraction - 0.2).abs() < 1e-12);
        assert_eq!(config.random_forest.n_estimators, 100);
    }

    #[test]
    fn test_load_rejects_bad_fraction() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"test_fraction": 1.5}}"#).unwrap();
        assert!(PipelineConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load("/nonexistent/config.json").unwrap_err();
        assert_eq!(err.kind(), "data_unavailable");
    }
}

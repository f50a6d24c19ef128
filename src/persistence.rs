//! Model and scaler persistence
//!
//! Artifact directory layout:
//! - one JSON file per trained model, named after its display name
//! - `scaler.json` with the shared standard scaler
//! - `registry.json` manifest listing models, accuracies and the best model
//! - `feature_transform.json` with the fitted encoding and imputation

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::data::transform::FeatureTransform;
use crate::error::{PredictorError, Result};
use crate::training::{ModelFamily, ModelRegistry, StandardScaler, TrainedModel};

pub const SCALER_FILE: &str = "scaler.json";
pub const REGISTRY_FILE: &str = "registry.json";
pub const TRANSFORM_FILE: &str = "feature_transform.json";

/// File name for a model's artifact, e.g. `random_forest.json`
pub fn model_file_name(display_name: &str) -> String {
    format!("{}.json", display_name.to_lowercase().replace(' ', "_"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub family: ModelFamily,
    pub file: String,
    pub accuracy: f64,
    pub macro_f1: f64,
}

/// Index of a saved training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryManifest {
    pub best_model: String,
    pub trained_at: DateTime<Utc>,
    pub models: Vec<ManifestEntry>,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn corrupt(message: String) -> PredictorError {
    PredictorError::Serialization(serde_json::Error::custom(message))
}

/// Save every trained model, the scaler and the manifest
pub fn save<P: AsRef<Path>>(
    registry: &ModelRegistry,
    scaler: &StandardScaler,
    dir: P,
) -> Result<RegistryManifest> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut entries = Vec::with_capacity(registry.len());
    for model in registry.models() {
        let file = model_file_name(&model.name);
        write_json(&dir.join(&file), model)?;
        info!("Saved {} to {:?}", model.name, dir.join(&file));
        entries.push(ManifestEntry {
            name: model.name.clone(),
            family: model.family,
            file,
            accuracy: model.accuracy,
            macro_f1: model.report.macro_f1,
        });
    }

    write_json(&dir.join(SCALER_FILE), scaler)?;

    let manifest = RegistryManifest {
        best_model: registry.best_name().to_string(),
        trained_at: Utc::now(),
        models: entries,
    };
    write_json(&dir.join(REGISTRY_FILE), &manifest)?;
    info!("Saved {} models to {:?}", registry.len(), dir);

    Ok(manifest)
}

/// Read the manifest of a saved run
pub fn read_manifest<P: AsRef<Path>>(dir: P) -> Result<RegistryManifest> {
    read_json(&dir.as_ref().join(REGISTRY_FILE))
}

/// Load a saved registry and its scaler
pub fn load<P: AsRef<Path>>(dir: P) -> Result<(ModelRegistry, StandardScaler)> {
    let dir = dir.as_ref();
    let manifest = read_manifest(dir)?;
    let scaler: StandardScaler = read_json(&dir.join(SCALER_FILE))?;
    if scaler.scale.len() != scaler.width()
        || scaler.scale.iter().any(|s| !s.is_finite() || *s <= 0.0)
    {
        return Err(corrupt(format!(
            "{} needs one positive finite scale per mean",
            SCALER_FILE
        )));
    }

    let mut models = Vec::with_capacity(manifest.models.len());
    for entry in &manifest.models {
        let model: TrainedModel = read_json(&dir.join(&entry.file))?;
        if model.name != entry.name {
            return Err(corrupt(format!(
                "{} holds model {:?}, manifest expects {:?}",
                entry.file, model.name, entry.name
            )));
        }
        if model.scaler != scaler {
            return Err(corrupt(format!(
                "{} was trained with a different scaler than {}",
                entry.file, SCALER_FILE
            )));
        }
        model
            .model
            .validate(scaler.width())
            .map_err(|reason| corrupt(format!("{}: {}", entry.file, reason)))?;
        models.push(model);
    }

    let registry = ModelRegistry::from_models(models, &manifest.best_model)
        .map_err(|e| corrupt(e.to_string()))?;
    info!(
        "Loaded {} models from {:?} (best: {})",
        registry.len(),
        dir,
        registry.best_name()
    );

    Ok((registry, scaler))
}

pub fn save_transform<P: AsRef<Path>>(transform: &FeatureTransform, dir: P) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    write_json(&dir.join(TRANSFORM_FILE), transform)
}

pub fn load_transform<P: AsRef<Path>>(dir: P) -> Result<FeatureTransform> {
    read_json(&dir.as_ref().join(TRANSFORM_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{train_with, BoostingConfig, ForestConfig, TrainingConfig};

    fn registry() -> ModelRegistry {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let j = (i % 5) as f64 * 0.1;
            x.push(vec![1.0 + j, 3.0]);
            y.push(1);
            x.push(vec![6.0 + j, 1.0]);
            y.push(2);
        }
        let config = TrainingConfig {
            random_forest: ForestConfig {
                n_estimators: 5,
                ..ForestConfig::default()
            },
            regularized_boosting: BoostingConfig {
                n_estimators: 5,
                ..BoostingConfig::regularized()
            },
            gradient_boosting: BoostingConfig {
                n_estimators: 5,
                ..BoostingConfig::comparison()
            },
        };
        train_with(&x, &y, 0.2, 42, &config, |_, _| {}).unwrap()
    }

    #[test]
    fn test_model_file_name() {
        assert_eq!(model_file_name("Random Forest"), "random_forest.json");
        assert_eq!(
            model_file_name("Regularized Boosting"),
            "regularized_boosting.json"
        );
        assert_eq!(model_file_name("Gradient Boosting"), "gradient_boosting.json");
    }

    #[test]
    fn test_save_load_round_trip() {
        let registry = registry();
        let scaler = registry.best().scaler.clone();
        let dir = tempfile::tempdir().unwrap();

        let manifest = save(&registry, &scaler, dir.path()).unwrap();
        assert_eq!(manifest.models.len(), 3);
        for file in ["random_forest.json", "regularized_boosting.json", "gradient_boosting.json"] {
            assert!(dir.path().join(file).exists());
        }
        assert!(dir.path().join(SCALER_FILE).exists());

        let (loaded, loaded_scaler) = load(dir.path()).unwrap();
        assert_eq!(loaded_scaler, scaler);
        assert_eq!(loaded, registry);
        assert_eq!(read_manifest(dir.path()).unwrap(), manifest);
    }

    #[test]
    fn test_load_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), "persistence");
    }

    #[test]
    fn test_load_corrupt_model_file() {
        let registry = registry();
        let dir = tempfile::tempdir().unwrap();
        save(&registry, &registry.best().scaler, dir.path()).unwrap();

        fs::write(dir.path().join("random_forest.json"), "{ not json").unwrap();
        let err = load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "serialization");
    }

    fn edit_artifact(dir: &Path, file: &str, edit: impl FnOnce(&mut serde_json::Value)) {
        let path = dir.join(file);
        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        edit(&mut value);
        fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();
    }

    fn saved_registry() -> tempfile::TempDir {
        let registry = registry();
        let dir = tempfile::tempdir().unwrap();
        save(&registry, &registry.best().scaler, dir.path()).unwrap();
        dir
    }

    fn first_split(nodes: &[serde_json::Value]) -> usize {
        nodes
            .iter()
            .position(|n| n.get("Split").is_some())
            .expect("tree has a split")
    }

    #[test]
    fn test_load_rejects_cyclic_tree() {
        let dir = saved_registry();
        edit_artifact(dir.path(), "random_forest.json", |v| {
            let nodes = v["model"]["trees"][0]["nodes"].as_array_mut().unwrap();
            let i = first_split(nodes);
            nodes[i]["Split"]["left"] = serde_json::json!(i);
        });

        let err = load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "serialization");
        assert!(err.to_string().contains("random_forest.json"));
    }

    #[test]
    fn test_load_rejects_out_of_range_child() {
        let dir = saved_registry();
        edit_artifact(dir.path(), "gradient_boosting.json", |v| {
            let nodes = v["model"]["rounds"][0][0]["nodes"].as_array_mut().unwrap();
            let past_end = nodes.len() + 10;
            let i = first_split(nodes);
            nodes[i]["Split"]["right"] = serde_json::json!(past_end);
        });

        assert_eq!(load(dir.path()).unwrap_err().kind(), "serialization");
    }

    #[test]
    fn test_load_rejects_empty_leaf() {
        let dir = saved_registry();
        edit_artifact(dir.path(), "regularized_boosting.json", |v| {
            let nodes = v["model"]["rounds"][0][0]["nodes"].as_array_mut().unwrap();
            for node in nodes.iter_mut() {
                if let Some(leaf) = node.get_mut("Leaf") {
                    leaf["value"] = serde_json::json!([]);
                }
            }
        });

        assert_eq!(load(dir.path()).unwrap_err().kind(), "serialization");
    }

    #[test]
    fn test_load_rejects_feature_count_mismatch() {
        let dir = saved_registry();
        edit_artifact(dir.path(), "random_forest.json", |v| {
            v["model"]["n_features"] = serde_json::json!(5);
        });

        assert_eq!(load(dir.path()).unwrap_err().kind(), "serialization");
    }

    #[test]
    fn test_load_rejects_mismatched_scaler() {
        let registry = registry();
        let dir = tempfile::tempdir().unwrap();
        let other = StandardScaler {
            mean: vec![0.0, 0.0],
            scale: vec![1.0, 1.0],
        };
        save(&registry, &other, dir.path()).unwrap();
        assert_eq!(load(dir.path()).unwrap_err().kind(), "serialization");
    }
}

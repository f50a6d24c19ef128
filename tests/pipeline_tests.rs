//! End-to-end pipeline tests: train, persist, reload and predict

use f1_predictor::config::{MissingValuePolicy, PipelineConfig};
use f1_predictor::data::{write_results_csv, DriverHistoryIndex, SyntheticRaceGenerator};
use f1_predictor::models::{ConfidenceSource, RaceEntry};
use f1_predictor::persistence::{self, REGISTRY_FILE, TRANSFORM_FILE};
use f1_predictor::pipeline;
use f1_predictor::training::{
    train_with, BoostingConfig, ForestConfig, TrainTestSplit, TrainingConfig,
};
use f1_predictor::Predictor;
use tempfile::TempDir;

fn fast_config(dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        model_dir: dir.path().to_path_buf(),
        random_forest: ForestConfig {
            n_estimators: 20,
            ..ForestConfig::default()
        },
        regularized_boosting: BoostingConfig {
            n_estimators: 15,
            ..BoostingConfig::regularized()
        },
        gradient_boosting: BoostingConfig {
            n_estimators: 15,
            ..BoostingConfig::comparison()
        },
        ..PipelineConfig::default()
    }
}

fn probe_entries(config: &PipelineConfig) -> Vec<RaceEntry> {
    let results = SyntheticRaceGenerator::new(config.synthetic.clone()).load(config.seed);
    let index = DriverHistoryIndex::from_results(&results);
    [
        ("Verstappen", "Monza", 1),
        ("Hamilton", "Spa", 4),
        ("Stroll", "Monaco", 15),
        ("Norris", "Silverstone", 2),
    ]
    .iter()
    .map(|(driver, track, grid)| {
        index
            .entry_for(driver, track, *grid, "Dry", 28.0)
            .expect("driver has history")
    })
    .collect()
}

#[test]
fn test_default_pipeline_end_to_end() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        model_dir: dir.path().to_path_buf(),
        ..PipelineConfig::default()
    };

    let outcome = pipeline::run(&config, None).unwrap();
    assert_eq!(outcome.registry.len(), 3);
    assert_eq!(outcome.manifest.best_model, outcome.registry.best_name());

    for file in [
        "random_forest.json",
        "regularized_boosting.json",
        "gradient_boosting.json",
        "scaler.json",
        REGISTRY_FILE,
        TRANSFORM_FILE,
    ] {
        assert!(dir.path().join(file).exists(), "missing {}", file);
    }

    let predictor = Predictor::from_dir(dir.path()).unwrap();
    for entry in probe_entries(&config) {
        let p = predictor.predict(&entry).unwrap();
        assert!((1..=20).contains(&p.predicted_position));
        assert!(p.confidence > 0.0 && p.confidence <= 1.0);
        assert_eq!(p.confidence_source, ConfidenceSource::ClassProbability);
        let win = p.win_probability.unwrap();
        let podium = p.podium_probability.unwrap();
        assert!(win <= podium + 1e-12);
        assert!(podium <= 1.0 + 1e-9);
        assert_eq!(p.model_used, outcome.registry.best_name());
    }

    let importances = predictor.feature_importances();
    assert_eq!(importances.len(), 12);
    let total: f64 = importances.iter().map(|(_, v)| v).sum();
    assert!((total - 1.0).abs() < 1e-6);
}

#[test]
fn test_fixed_seed_is_reproducible() {
    let (dir_a, dir_b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let a = pipeline::run(&fast_config(&dir_a), None).unwrap();
    let b = pipeline::run(&fast_config(&dir_b), None).unwrap();

    assert_eq!(a.registry.best_name(), b.registry.best_name());
    assert_eq!(a.registry.best().scaler, b.registry.best().scaler);
    assert_eq!(a.registry, b.registry);
    assert_eq!(a.transform, b.transform);

    let n = 250;
    assert_eq!(
        TrainTestSplit::new(n, 0.2, 42).unwrap(),
        TrainTestSplit::new(n, 0.2, 42).unwrap()
    );
}

#[test]
fn test_save_load_round_trip_predictions() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(&dir);
    let outcome = pipeline::run(&config, None).unwrap();

    let scaler = outcome.registry.best().scaler.clone();
    let in_memory = Predictor::new(outcome.transform.clone(), outcome.registry.clone(), scaler)
        .unwrap();
    let reloaded = Predictor::from_dir(dir.path()).unwrap();

    for entry in probe_entries(&config) {
        assert_eq!(
            in_memory.predict(&entry).unwrap(),
            reloaded.predict(&entry).unwrap()
        );
    }

    let (registry, _) = persistence::load(dir.path()).unwrap();
    assert_eq!(registry, outcome.registry);
}

#[test]
fn test_unknown_category_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(&dir);
    pipeline::run(&config, None).unwrap();
    let predictor = Predictor::from_dir(dir.path()).unwrap();

    let mut entry = probe_entries(&config).remove(0);
    entry.track = "Imola".to_string();
    let rejected = predictor.respond(&entry).unwrap_err();
    assert_eq!(rejected.error, "unknown_category");
    assert!(rejected.message.contains("Imola"));

    let mut entry = probe_entries(&config).remove(0);
    entry.grid_position = 0;
    assert_eq!(predictor.respond(&entry).unwrap_err().error, "invalid_input");
}

#[test]
fn test_batch_is_ordered_by_position() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(&dir);
    pipeline::run(&config, None).unwrap();
    let predictor = Predictor::from_dir(dir.path()).unwrap();

    let mut entries = probe_entries(&config);
    let mut bad = entries[0].clone();
    bad.weather = "Snow".to_string();
    entries.insert(1, bad);

    let outcomes = predictor.predict_batch(&entries);
    assert_eq!(outcomes.len(), entries.len());

    let positions: Vec<u8> = outcomes
        .iter()
        .filter_map(|o| o.as_ref().ok())
        .map(|p| p.predicted_position)
        .collect();
    assert_eq!(positions.len(), 4);
    assert!(positions.windows(2).all(|w| w[0] <= w[1]));
    assert!(outcomes.last().unwrap().is_err());
}

#[test]
fn test_all_families_failing_is_insufficient_data() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(&dir);
    config.random_forest.n_estimators = 0;
    config.regularized_boosting.learning_rate = -0.1;
    config.gradient_boosting.max_depth = 0;

    let err = match pipeline::run(&config, None) {
        Ok(_) => panic!("training should fail"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), "insufficient_data");
    assert!(!dir.path().join(REGISTRY_FILE).exists());
}

#[test]
fn test_accuracy_tie_selects_forest() {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for i in 0..40 {
        let j = (i % 5) as f64 * 0.1;
        x.push(vec![1.0 + j, 0.0]);
        y.push(1);
        x.push(vec![20.0 + j, 0.0]);
        y.push(2);
        x.push(vec![40.0 + j, 0.0]);
        y.push(3);
    }
    let config = TrainingConfig {
        random_forest: ForestConfig {
            n_estimators: 10,
            ..ForestConfig::default()
        },
        regularized_boosting: BoostingConfig {
            n_estimators: 10,
            ..BoostingConfig::regularized()
        },
        gradient_boosting: BoostingConfig {
            n_estimators: 10,
            ..BoostingConfig::comparison()
        },
    };

    let registry = train_with(&x, &y, 0.2, 42, &config, |_, _| {}).unwrap();
    assert!(registry.models().iter().all(|m| m.accuracy == 1.0));
    assert_eq!(registry.best_name(), "Random Forest");
}

#[test]
fn test_pipeline_from_csv_with_train_only_imputation() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(&dir);
    config.missing_values = MissingValuePolicy::TrainOnly;

    let csv_path = dir.path().join("results.csv");
    let results = SyntheticRaceGenerator::new(config.synthetic.clone()).load(7);
    write_results_csv(&results, &csv_path).unwrap();

    let outcome = pipeline::run(&config, Some(&csv_path)).unwrap();
    assert_eq!(outcome.transform.policy, MissingValuePolicy::TrainOnly);

    let transform = persistence::load_transform(dir.path()).unwrap();
    assert_eq!(transform, outcome.transform);
}

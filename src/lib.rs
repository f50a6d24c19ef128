//! F1 Predictor - Formula 1 finishing-position prediction
//!
//! This library provides:
//! - Race-result loading (synthetic generator or CSV)
//! - Leakage-free historical feature engineering
//! - Random forest and boosted tree classifiers with model selection
//! - JSON persistence of trained models, scaler and feature transform
//! - Inference on single race entries and batches
//!
//! # Example
//!
//! ```no_run
//! use f1_predictor::config::PipelineConfig;
//! use f1_predictor::pipeline;
//! use f1_predictor::predictor::Predictor;
//!
//! let config = PipelineConfig::default();
//! let outcome = pipeline::run(&config, None).unwrap();
//! println!("Best model: {}", outcome.registry.best_name());
//!
//! let predictor = Predictor::from_dir(&config.model_dir).unwrap();
//! println!("{:?}", predictor.feature_importances());
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod predictor;
pub mod training;

// Re-export commonly used types
pub use config::{MissingValuePolicy, PipelineConfig};
pub use data::{FeatureEngineering, FeatureTransform};
pub use error::{PredictorError, RejectedPrediction, Result};
pub use models::{ConfidenceSource, ModelSummary, Prediction, RaceEntry, RaceResult, Weather};
pub use predictor::Predictor;
pub use training::{train, ModelRegistry, StandardScaler, TrainedModel};

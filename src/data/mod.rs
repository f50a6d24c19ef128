//! Data loading and feature engineering modules

pub mod csv_loader;
pub mod encoding;
pub mod features;
pub mod history;
pub mod loader;
pub mod transform;

// Re-export commonly used types
pub use csv_loader::{load_results_csv, write_results_csv};
pub use encoding::{CategoricalField, EncodedRow, FittedEncoding, Vocabulary};
pub use features::{
    FeatureEngineering, FeatureRow, HistoricalFeatures, HistoryAccumulator, FEATURE_COLUMNS,
};
pub use history::DriverHistoryIndex;
pub use loader::{validate_results, SyntheticConfig, SyntheticRaceGenerator};
pub use transform::{ColumnMeans, FeatureTransform};

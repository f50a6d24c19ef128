use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline and inference errors
#[derive(Debug, Error)]
pub enum PredictorError {
    /// Race-result source could not be read
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// A race result violates the table invariants
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Degenerate label or feature set
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Category absent from the fitted vocabulary
    #[error("Unknown {field} category: {value:?}")]
    UnknownCategory { field: String, value: String },

    /// Inference input outside its valid range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// One classifier family failed to train
    #[error("Model fit failure ({model}): {reason}")]
    ModelFitFailure { model: String, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PredictorError {
    /// Stable machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            PredictorError::DataUnavailable(_) => "data_unavailable",
            PredictorError::InvalidRecord(_) => "invalid_record",
            PredictorError::InsufficientData(_) => "insufficient_data",
            PredictorError::UnknownCategory { .. } => "unknown_category",
            PredictorError::InvalidInput(_) => "invalid_input",
            PredictorError::ModelFitFailure { .. } => "model_fit_failure",
            PredictorError::Persistence(_) => "persistence",
            PredictorError::Serialization(_) => "serialization",
        }
    }

    pub(crate) fn fit_failure(model: &str, reason: impl Into<String>) -> Self {
        PredictorError::ModelFitFailure {
            model: model.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::prelude::PolarsError> for PredictorError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        PredictorError::DataUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PredictorError>;

/// Rejected prediction returned across the serving boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedPrediction {
    pub error: String,
    pub message: String,
}

impl From<&PredictorError> for RejectedPrediction {
    fn from(err: &PredictorError) -> Self {
        Self {
            error: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Validation functions
pub fn validate_grid_position(position: u8) -> Result<()> {
    if !(1..=20).contains(&position) {
        return Err(PredictorError::InvalidInput(format!(
            "Grid position must be between 1 and 20, got {}",
            position
        )));
    }
    Ok(())
}

pub fn validate_win_rate(rate: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(PredictorError::InvalidInput(format!(
            "Win rate must be between 0 and 1, got {}",
            rate
        )));
    }
    Ok(())
}

pub fn validate_finite(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(PredictorError::InvalidInput(format!(
            "{} must be a finite number, got {}",
            name, value
        )));
    }
    Ok(())
}

pub fn validate_test_fraction(fraction: f64) -> Result<()> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(PredictorError::InsufficientData(format!(
            "Test fraction must be in (0, 1), got {}",
            fraction
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_grid_position_valid() {
        for i in 1..=20 {
            assert!(validate_grid_position(i).is_ok());
        }
    }

    #[test]
    fn test_validate_grid_position_invalid() {
        assert!(validate_grid_position(0).is_err());
        assert!(validate_grid_position(21).is_err());
    }

    #[test]
    fn test_validate_win_rate() {
        assert!(validate_win_rate(0.0).is_ok());
        assert!(validate_win_rate(0.5).is_ok());
        assert!(validate_win_rate(1.0).is_ok());
        assert!(validate_win_rate(-0.1).is_err());
        assert!(validate_win_rate(1.1).is_err());
    }

    #[test]
    fn test_validate_finite() {
        assert!(validate_finite("temperature", 25.0).is_ok());
        assert!(validate_finite("temperature", f64::NAN).is_err());
        assert!(validate_finite("temperature", f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_test_fraction() {
        assert!(validate_test_fraction(0.2).is_ok());
        assert!(validate_test_fraction(0.0).is_err());
        assert!(validate_test_fraction(1.0).is_err());
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            PredictorError::DataUnavailable("x".into()),
            PredictorError::InvalidRecord("x".into()),
            PredictorError::InsufficientData("x".into()),
            PredictorError::UnknownCategory {
                field: "weather".into(),
                value: "Clear".into(),
            },
            PredictorError::InvalidInput("x".into()),
            PredictorError::fit_failure("Random Forest", "x"),
        ];
        let mut kinds: Vec<&str> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_rejected_prediction_from_error() {
        let err = PredictorError::UnknownCategory {
            field: "weather".into(),
            value: "Clear".into(),
        };

        let rejected = RejectedPrediction::from(&err);
        assert_eq!(rejected.error, "unknown_category");
        assert!(rejected.message.contains("Clear"));
    }

    #[test]
    fn test_error_display() {
        let err = PredictorError::InsufficientData("test error".to_string());
        assert!(err.to_string().contains("Insufficient data"));
    }
}

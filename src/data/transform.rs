//! Fitted feature transform
//!
//! Bundles everything fit on training data that inference has to replay:
//! the categorical encoding, the imputation means and the column order.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::MissingValuePolicy;
use crate::data::encoding::{CategoricalField, EncodedRow, FittedEncoding};
use crate::data::features::FEATURE_COLUMNS;
use crate::error::{
    validate_finite, validate_grid_position, validate_win_rate, PredictorError, Result,
};
use crate::models::RaceEntry;

/// Per-column means used to fill missing values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeans {
    pub means: Vec<f64>,
}

impl ColumnMeans {
    /// Fit means over the given rows, ignoring missing values
    pub fn fit<'a>(rows: impl IntoIterator<Item = &'a EncodedRow>, width: usize) -> Self {
        let mut sums = vec![0.0; width];
        let mut counts = vec![0usize; width];

        for row in rows {
            for (col, value) in row.values.iter().enumerate().take(width) {
                if let Some(v) = value {
                    sums[col] += v;
                    counts[col] += 1;
                }
            }
        }

        let means = sums
            .iter()
            .zip(counts.iter())
            .enumerate()
            .map(|(col, (&sum, &count))| {
                if count == 0 {
                    warn!(
                        "Column {} has no observed values; imputing 0.0",
                        FEATURE_COLUMNS.get(col).copied().unwrap_or("?")
                    );
                    0.0
                } else {
                    sum / count as f64
                }
            })
            .collect();

        Self { means }
    }

    /// Fill missing values with the fitted means
    pub fn apply(&self, values: &[Option<f64>]) -> Vec<f64> {
        values
            .iter()
            .zip(self.means.iter())
            .map(|(v, mean)| v.unwrap_or(*mean))
            .collect()
    }
}

/// Immutable fitted transform threaded into training and inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransform {
    pub encoding: FittedEncoding,
    pub imputation: ColumnMeans,
    pub policy: MissingValuePolicy,
    pub feature_columns: Vec<String>,
}

impl FeatureTransform {
    pub fn new(encoding: FittedEncoding, imputation: ColumnMeans, policy: MissingValuePolicy) -> Self {
        Self {
            encoding,
            imputation,
            policy,
            feature_columns: FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Impute a batch of encoded rows into a dense matrix
    pub fn impute_rows(&self, rows: &[EncodedRow]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.imputation.apply(&r.values)).collect()
    }

    /// Build the unscaled model input for one serving-shim entry
    pub fn entry_features(&self, entry: &RaceEntry) -> Result<Vec<f64>> {
        validate_grid_position(entry.grid_position)?;
        validate_win_rate(entry.win_rate)?;
        validate_finite("recent_form", entry.recent_form)?;
        validate_finite("track_avg", entry.track_avg)?;
        validate_finite("team_rating", entry.team_rating)?;
        validate_finite("temperature", entry.temperature)?;
        if let Some(rate) = entry.dnf_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(PredictorError::InvalidInput(format!(
                    "DNF rate must be between 0 and 1, got {}",
                    rate
                )));
            }
        }
        if let Some(q) = entry.quali_strength {
            validate_finite("quali_strength", q)?;
        }

        let enc = &self.encoding;
        let values = vec![
            Some(entry.grid_position as f64),
            Some(entry.recent_form),
            Some(entry.win_rate),
            Some(entry.track_avg),
            Some(entry.team_rating),
            entry.dnf_rate,
            entry.quali_strength,
            Some(entry.temperature),
            Some(enc.encode(CategoricalField::Weather, &entry.weather)?),
            Some(enc.encode(CategoricalField::Driver, &entry.driver)?),
            Some(enc.encode(CategoricalField::Team, &entry.team)?),
            Some(enc.encode(CategoricalField::Track, &entry.track)?),
        ];

        Ok(self.imputation.apply(&values))
    }
}

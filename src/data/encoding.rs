//! Categorical encoding
//!
//! Maps driver, team, track and weather labels to dense integer codes.
//! Codes follow sorted label order. The table is fit once and never grows:
//! a label outside the fitted vocabulary is an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::data::features::{FeatureRow, FEATURE_COLUMNS};
use crate::error::{PredictorError, Result};

/// Categorical input fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoricalField {
    Driver,
    Team,
    Track,
    Weather,
}

impl CategoricalField {
    pub fn name(&self) -> &'static str {
        match self {
            CategoricalField::Driver => "driver",
            CategoricalField::Team => "team",
            CategoricalField::Track => "track",
            CategoricalField::Weather => "weather",
        }
    }
}

/// Sorted label vocabulary for one field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    labels: Vec<String>,
}

impl Vocabulary {
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let unique: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            labels: unique.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn code(&self, label: &str) -> Option<usize> {
        self.labels
            .binary_search_by(|candidate| candidate.as_str().cmp(label))
            .ok()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Fitted label encoding for all categorical fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedEncoding {
    pub driver: Vocabulary,
    pub team: Vocabulary,
    pub track: Vocabulary,
    pub weather: Vocabulary,
}

/// Feature row with categorical fields encoded; numeric gaps still open
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRow {
    pub race_id: u32,
    pub driver: String,
    /// One value per `FEATURE_COLUMNS` entry
    pub values: Vec<Option<f64>>,
    /// Classified finish position, `None` when unclassified
    pub label: Option<u8>,
}

impl FittedEncoding {
    /// Fit vocabularies over the training rows
    pub fn fit(rows: &[FeatureRow]) -> Result<Self> {
        if rows.is_empty() {
            return Err(PredictorError::InsufficientData(
                "cannot fit encoding on an empty table".to_string(),
            ));
        }

        Ok(Self {
            driver: Vocabulary::fit(rows.iter().map(|r| r.result.driver.as_str())),
            team: Vocabulary::fit(rows.iter().map(|r| r.result.team.as_str())),
            track: Vocabulary::fit(rows.iter().map(|r| r.result.track.as_str())),
            weather: Vocabulary::fit(rows.iter().map(|r| r.result.weather.as_str())),
        })
    }

    fn vocabulary(&self, field: CategoricalField) -> &Vocabulary {
        match field {
            CategoricalField::Driver => &self.driver,
            CategoricalField::Team => &self.team,
            CategoricalField::Track => &self.track,
            CategoricalField::Weather => &self.weather,
        }
    }

    /// Encode one label, failing on labels outside the vocabulary
    pub fn encode(&self, field: CategoricalField, label: &str) -> Result<f64> {
        self.vocabulary(field)
            .code(label)
            .map(|code| code as f64)
            .ok_or_else(|| PredictorError::UnknownCategory {
                field: field.name().to_string(),
                value: label.to_string(),
            })
    }

    /// Encode a feature row into model column order
    pub fn encode_row(&self, row: &FeatureRow) -> Result<EncodedRow> {
        let r = &row.result;
        let mut values: Vec<Option<f64>> = Vec::with_capacity(FEATURE_COLUMNS.len());
        values.extend(row.numeric_values());
        values.push(Some(self.encode(CategoricalField::Weather, r.weather.as_str())?));
        values.push(Some(self.encode(CategoricalField::Driver, &r.driver)?));
        values.push(Some(self.encode(CategoricalField::Team, &r.team)?));
        values.push(Some(self.encode(CategoricalField::Track, &r.track)?));

        Ok(EncodedRow {
            race_id: r.race_id,
            driver: r.driver.clone(),
            values,
            label: r.finish_position,
        })
    }

    pub fn encode_rows(&self, rows: &[FeatureRow]) -> Result<Vec<EncodedRow>> {
        rows.iter().map(|row| self.encode_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::features::FeatureEngineering;
    use crate::data::loader;

    #[test]
    fn test_vocabulary_codes_are_sorted_and_dense() {
        let vocab = Vocabulary::fit(["Spa", "Monza", "Spa", "Abu Dhabi"]);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.code("Abu Dhabi"), Some(0));
        assert_eq!(vocab.code("Monza"), Some(1));
        assert_eq!(vocab.code("Spa"), Some(2));
        assert_eq!(vocab.code("Monaco"), None);
    }

    #[test]
    fn test_fit_and_encode_rows() {
        let rows = FeatureEngineering::derive(&loader::load(42));
        let encoding = FittedEncoding::fit(&rows).unwrap();

        assert_eq!(encoding.driver.len(), 10);
        assert_eq!(encoding.team.len(), 5);
        assert_eq!(encoding.track.len(), 5);

        let encoded = encoding.encode_rows(&rows).unwrap();
        assert_eq!(encoded.len(), rows.len());
        for row in &encoded {
            assert_eq!(row.values.len(), FEATURE_COLUMNS.len());
            // Categorical codes are never missing
            assert!(row.values[8..].iter().all(|v| v.is_some()));
        }
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let rows = FeatureEngineering::derive(&loader::load(42));
        let encoding = FittedEncoding::fit(&rows).unwrap();

        let err = encoding
            .encode(CategoricalField::Driver, "Schumacher")
            .unwrap_err();
        match err {
            PredictorError::UnknownCategory { field, value } => {
                assert_eq!(field, "driver");
                assert_eq!(value, "Schumacher");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(encoding.encode(CategoricalField::Weather, "Clear").is_err());
    }

    #[test]
    fn test_encoding_is_stable_across_fits() {
        let rows = FeatureEngineering::derive(&loader::load(42));
        let a = FittedEncoding::fit(&rows).unwrap();
        let b = FittedEncoding::fit(&rows).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_empty_is_insufficient() {
        let err = FittedEncoding::fit(&[]).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }
}

//! Finishing-position inference
//!
//! Replays the persisted feature transform and scaler on a race entry and
//! runs the registry's best model.

use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, info};

use crate::data::transform::FeatureTransform;
use crate::error::{PredictorError, RejectedPrediction, Result};
use crate::models::{ConfidenceSource, Prediction, RaceEntry};
use crate::persistence;
use crate::training::{Classifier, ModelRegistry, StandardScaler};

/// Positions counted as a podium finish
const PODIUM: std::ops::RangeInclusive<u8> = 1..=3;

/// Positional confidence used when a classifier exposes no probabilities
///
/// `85 - 5 * |predicted - grid|` percent, clamped to [60, 95].
pub fn heuristic_confidence(predicted_position: u8, grid_position: u8) -> f64 {
    let gap = (predicted_position as f64 - grid_position as f64).abs();
    (85.0 - gap * 5.0).clamp(60.0, 95.0) / 100.0
}

/// Build a prediction from any classifier on an already scaled row
pub fn predict_with_classifier(
    classifier: &dyn Classifier,
    scaled: &[f64],
    entry: &RaceEntry,
    model_used: &str,
) -> Prediction {
    let predicted_position = classifier.predict(scaled);

    let (confidence, confidence_source, win_probability, podium_probability) =
        match classifier.predict_proba(scaled) {
            Some(probs) => {
                let classes = classifier.classes();
                let confidence = probs.iter().copied().fold(0.0, f64::max);
                let win: f64 = classes
                    .iter()
                    .zip(&probs)
                    .filter(|(c, _)| **c == 1)
                    .map(|(_, p)| p)
                    .sum();
                let podium: f64 = classes
                    .iter()
                    .zip(&probs)
                    .filter(|(c, _)| PODIUM.contains(*c))
                    .map(|(_, p)| p)
                    .sum();
                (
                    confidence,
                    ConfidenceSource::ClassProbability,
                    Some(win),
                    Some(podium),
                )
            }
            None => (
                heuristic_confidence(predicted_position, entry.grid_position),
                ConfidenceSource::Heuristic,
                None,
                None,
            ),
        };

    Prediction {
        driver: entry.driver.clone(),
        track: entry.track.clone(),
        grid_position: entry.grid_position,
        predicted_position,
        confidence,
        confidence_source,
        win_probability,
        podium_probability,
        model_used: model_used.to_string(),
    }
}

/// Inference over a loaded training run
pub struct Predictor {
    transform: FeatureTransform,
    registry: ModelRegistry,
    scaler: StandardScaler,
}

impl Predictor {
    pub fn new(
        transform: FeatureTransform,
        registry: ModelRegistry,
        scaler: StandardScaler,
    ) -> Result<Self> {
        if scaler.width() != transform.feature_columns.len() {
            return Err(PredictorError::InvalidInput(format!(
                "scaler expects {} features, transform produces {}",
                scaler.width(),
                transform.feature_columns.len()
            )));
        }
        Ok(Self {
            transform,
            registry,
            scaler,
        })
    }

    /// Load transform, registry and scaler from an artifact directory
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let transform = persistence::load_transform(dir)?;
        let (registry, scaler) = persistence::load(dir)?;
        info!("Predictor ready with {}", registry.best_name());
        Self::new(transform, registry, scaler)
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn model_name(&self) -> &str {
        self.registry.best_name()
    }

    /// Predict one entry with the best model
    pub fn predict(&self, entry: &RaceEntry) -> Result<Prediction> {
        let raw = self.transform.entry_features(entry)?;
        let scaled = self.scaler.transform_row(&raw)?;
        let best = self.registry.best();
        let prediction = predict_with_classifier(&best.model, &scaled, entry, &best.name);
        debug!(
            "{} at {}: P{} ({:.2})",
            prediction.driver, prediction.track, prediction.predicted_position, prediction.confidence
        );
        Ok(prediction)
    }

    /// Predict one entry, mapping failures to a rejected prediction
    pub fn respond(&self, entry: &RaceEntry) -> std::result::Result<Prediction, RejectedPrediction> {
        self.predict(entry).map_err(|e| RejectedPrediction::from(&e))
    }

    /// Predict many entries
    ///
    /// Successful predictions come first ordered by predicted position, then
    /// confidence (highest first); rejected entries follow in input order.
    pub fn predict_batch(
        &self,
        entries: &[RaceEntry],
    ) -> Vec<std::result::Result<Prediction, RejectedPrediction>> {
        let (mut ok, rejected): (Vec<_>, Vec<_>) = entries
            .iter()
            .map(|e| self.respond(e))
            .partition(|r| r.is_ok());

        ok.sort_by(|a, b| match (a, b) {
            (Ok(a), Ok(b)) => a
                .predicted_position
                .cmp(&b.predicted_position)
                .then_with(|| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(Ordering::Equal)
                }),
            _ => Ordering::Equal,
        });

        ok.into_iter().chain(rejected).collect()
    }

    /// Best model's feature importances, most important first
    pub fn feature_importances(&self) -> Vec<(String, f64)> {
        let mut pairs: Vec<(String, f64)> = self
            .transform
            .feature_columns
            .iter()
            .cloned()
            .zip(self.registry.best().model.feature_importances().iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classifier that always predicts one position and has no probabilities
    struct FixedClassifier {
        classes: Vec<u8>,
        position: u8,
    }

    impl Classifier for FixedClassifier {
        fn classes(&self) -> &[u8] {
            &self.classes
        }

        fn predict(&self, _row: &[f64]) -> u8 {
            self.position
        }

        fn predict_proba(&self, _row: &[f64]) -> Option<Vec<f64>> {
            None
        }
    }

    /// Classifier with fixed probabilities
    struct ProbClassifier {
        classes: Vec<u8>,
        probs: Vec<f64>,
    }

    impl Classifier for ProbClassifier {
        fn classes(&self) -> &[u8] {
            &self.classes
        }

        fn predict(&self, _row: &[f64]) -> u8 {
            self.classes[crate::training::model::argmax(&self.probs)]
        }

        fn predict_proba(&self, _row: &[f64]) -> Option<Vec<f64>> {
            Some(self.probs.clone())
        }
    }

    fn entry(grid: u8) -> RaceEntry {
        RaceEntry {
            driver: "Leclerc".to_string(),
            team: "Ferrari".to_string(),
            track: "Monza".to_string(),
            grid_position: grid,
            recent_form: 4.0,
            win_rate: 0.1,
            track_avg: 3.0,
            team_rating: 3.5,
            weather: "Dry".to_string(),
            temperature: 27.0,
            dnf_rate: None,
            quali_strength: None,
        }
    }

    #[test]
    fn test_heuristic_confidence() {
        assert!((heuristic_confidence(3, 3) - 0.85).abs() < 1e-12);
        assert!((heuristic_confidence(5, 3) - 0.75).abs() < 1e-12);
        // Clamped at both ends
        assert!((heuristic_confidence(20, 1) - 0.60).abs() < 1e-12);
        assert!(heuristic_confidence(1, 1) <= 0.95);
    }

    #[test]
    fn test_heuristic_used_without_probabilities() {
        let classifier = FixedClassifier {
            classes: vec![1, 2, 3, 4],
            position: 4,
        };
        let p = predict_with_classifier(&classifier, &[0.0], &entry(2), "Fixed");

        assert_eq!(p.predicted_position, 4);
        assert_eq!(p.confidence_source, ConfidenceSource::Heuristic);
        assert!((p.confidence - 0.75).abs() < 1e-12);
        assert_eq!(p.win_probability, None);
        assert_eq!(p.podium_probability, None);
        assert_eq!(p.model_used, "Fixed");
    }

    #[test]
    fn test_probabilities_drive_confidence() {
        let classifier = ProbClassifier {
            classes: vec![1, 2, 3, 7],
            probs: vec![0.1, 0.5, 0.15, 0.25],
        };
        let p = predict_with_classifier(&classifier, &[0.0], &entry(5), "Prob");

        assert_eq!(p.predicted_position, 2);
        assert_eq!(p.confidence_source, ConfidenceSource::ClassProbability);
        assert!((p.confidence - 0.5).abs() < 1e-12);
        assert!((p.win_probability.unwrap() - 0.1).abs() < 1e-12);
        assert!((p.podium_probability.unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_win_probability_zero_without_winner_class() {
        let classifier = ProbClassifier {
            classes: vec![4, 9],
            probs: vec![0.7, 0.3],
        };
        let p = predict_with_classifier(&classifier, &[0.0], &entry(5), "Prob");
        assert_eq!(p.win_probability, Some(0.0));
        assert_eq!(p.podium_probability, Some(0.0));
    }
}

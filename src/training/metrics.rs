//! Evaluation Metrics
//!
//! Held-out accuracy and a per-class precision/recall/F1 report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fraction of predictions equal to the truth; 0 for empty input
pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Metrics for one finishing position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: u8,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub support: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationReport {
    /// Build the report over every label seen in truth or predictions
    ///
    /// Undefined precision or recall (zero denominator) counts as 0.
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let labels: BTreeSet<u8> = y_true.iter().chain(y_pred).copied().collect();

        let classes: Vec<ClassMetrics> = labels
            .into_iter()
            .map(|label| {
                let tp = y_true
                    .iter()
                    .zip(y_pred)
                    .filter(|(&t, &p)| t == label && p == label)
                    .count();
                let predicted = y_pred.iter().filter(|&&p| p == label).count();
                let support = y_true.iter().filter(|&&t| t == label).count();

                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                ClassMetrics {
                    label,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let n = classes.len().max(1) as f64;
        let macro_precision = classes.iter().map(|c| c.precision).sum::<f64>() / n;
        let macro_recall = classes.iter().map(|c| c.recall).sum::<f64>() / n;
        let macro_f1 = classes.iter().map(|c| c.f1).sum::<f64>() / n;

        Self {
            classes,
            accuracy: accuracy(y_true, y_pred),
            macro_precision,
            macro_recall,
            macro_f1,
            support: y_true.len(),
        }
    }
}

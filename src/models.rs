use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest and highest valid grid / finishing position
pub const MIN_POSITION: u8 = 1;
pub const MAX_POSITION: u8 = 20;

/// Weather category for a race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weather {
    Dry,
    Wet,
}

impl Weather {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weather::Dry => "Dry",
            Weather::Wet => "Wet",
        }
    }

    /// Parse a weather label (exact, case-sensitive match)
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Dry" => Some(Weather::Dry),
            "Wet" => Some(Weather::Wet),
            _ => None,
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One historical result for a (driver, race) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub race_id: u32,
    pub year: u16,
    pub track: String,
    pub driver: String,
    pub team: String,
    pub grid_position: u8,
    /// `None` marks an unclassified (did-not-finish) result
    pub finish_position: Option<u8>,
    pub points: f64,
    pub fastest_lap: bool,
    pub dnf: bool,
    pub weather: Weather,
    pub temperature: f64,
}

impl RaceResult {
    pub fn is_win(&self) -> bool {
        self.finish_position == Some(1)
    }
}

/// Candidate race entry handed over by the serving shim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceEntry {
    pub driver: String,
    pub team: String,
    pub track: String,
    pub grid_position: u8,
    pub recent_form: f64,
    pub win_rate: f64,
    pub track_avg: f64,
    pub team_rating: f64,
    pub weather: String,
    pub temperature: f64,
    #[serde(default)]
    pub dnf_rate: Option<f64>,
    #[serde(default)]
    pub quali_strength: Option<f64>,
}

/// Where a prediction's confidence score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    /// Maximum class probability reported by the classifier
    ClassProbability,
    /// Positional heuristic, used when no probabilities are available
    Heuristic,
}

/// Finishing-position prediction for a single entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub driver: String,
    pub track: String,
    pub grid_position: u8,
    pub predicted_position: u8,
    pub confidence: f64,
    pub confidence_source: ConfidenceSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub podium_probability: Option<f64>,
    pub model_used: String,
}

/// Performance summary of one trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub accuracy: f64,
    pub macro_f1: f64,
    pub is_best: bool,
}

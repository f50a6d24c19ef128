//! Feature Engineering
//!
//! Derive per-driver, per-track and qualifying features from race history.
//!
//! Every aggregate is computed from the entity's own races strictly before
//! the current one, walking races in race-id order. Results of the current
//! race are folded into the history only after every row of that race has
//! been featurized, so teammates never see each other's result.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::models::RaceResult;

/// Trailing window for recent form
pub const RECENT_FORM_WINDOW: usize = 5;

/// Model input columns, in matrix order
pub const FEATURE_COLUMNS: [&str; 12] = [
    "grid_position",
    "recent_form",
    "driver_win_rate",
    "driver_track_avg",
    "team_track_avg",
    "dnf_rate",
    "quali_strength",
    "temperature",
    "weather_code",
    "driver_code",
    "team_code",
    "track_code",
];

/// History-derived signals for one driver entering one race
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalFeatures {
    pub recent_form: Option<f64>,
    pub driver_win_rate: Option<f64>,
    pub dnf_rate: Option<f64>,
    pub driver_track_avg: Option<f64>,
    pub team_track_avg: Option<f64>,
    pub quali_strength: Option<f64>,
}

/// Race result augmented with derived features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub result: RaceResult,
    pub historical: HistoricalFeatures,
    /// grid - finish; positive means places gained
    pub position_change: Option<f64>,
}

impl FeatureRow {
    /// Numeric (non-categorical) model inputs in `FEATURE_COLUMNS` order
    pub fn numeric_values(&self) -> [Option<f64>; 8] {
        let h = &self.historical;
        [
            Some(self.result.grid_position as f64),
            h.recent_form,
            h.driver_win_rate,
            h.driver_track_avg,
            h.team_track_avg,
            h.dnf_rate,
            h.quali_strength,
            Some(self.result.temperature),
        ]
    }
}

#[derive(Debug, Default)]
struct DriverStats {
    /// Finishes of the last `RECENT_FORM_WINDOW` races; `None` = unclassified
    recent: VecDeque<Option<u8>>,
    races: usize,
    wins: usize,
    dnfs: usize,
    grid_sum: f64,
}

#[derive(Debug, Default)]
struct PairStats {
    finish_sum: f64,
    finishes: usize,
}

impl PairStats {
    fn mean(&self) -> Option<f64> {
        if self.finishes == 0 {
            None
        } else {
            Some(self.finish_sum / self.finishes as f64)
        }
    }
}

/// Running per-driver and per-pair aggregates over observed results
#[derive(Debug, Default)]
pub struct HistoryAccumulator {
    drivers: HashMap<String, DriverStats>,
    driver_track: HashMap<(String, String), PairStats>,
    team_track: HashMap<(String, String), PairStats>,
}

impl HistoryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one result into the history
    pub fn observe(&mut self, result: &RaceResult) {
        let stats = self.drivers.entry(result.driver.clone()).or_default();
        if stats.recent.len() == RECENT_FORM_WINDOW {
            stats.recent.pop_front();
        }
        stats.recent.push_back(result.finish_position);
        stats.races += 1;
        stats.grid_sum += result.grid_position as f64;
        if result.is_win() {
            stats.wins += 1;
        }
        if result.dnf {
            stats.dnfs += 1;
        }

        if let Some(finish) = result.finish_position {
            let pair = self
                .driver_track
                .entry((result.driver.clone(), result.track.clone()))
                .or_default();
            pair.finish_sum += finish as f64;
            pair.finishes += 1;

            let pair = self
                .team_track
                .entry((result.team.clone(), result.track.clone()))
                .or_default();
            pair.finish_sum += finish as f64;
            pair.finishes += 1;
        }
    }

    /// Number of observed races for a driver
    pub fn race_count(&self, driver: &str) -> usize {
        self.drivers.get(driver).map(|s| s.races).unwrap_or(0)
    }

    /// Features for a driver entering a race, from observed history only
    pub fn features_for(&self, driver: &str, team: &str, track: &str) -> HistoricalFeatures {
        let key = |a: &str, b: &str| (a.to_string(), b.to_string());
        let driver_track_avg = self.driver_track.get(&key(driver, track)).and_then(PairStats::mean);
        let team_track_avg = self.team_track.get(&key(team, track)).and_then(PairStats::mean);

        let stats = match self.drivers.get(driver) {
            Some(stats) if stats.races > 0 => stats,
            _ => {
                return HistoricalFeatures {
                    driver_track_avg,
                    team_track_avg,
                    ..HistoricalFeatures::default()
                }
            }
        };

        let races = stats.races as f64;
        HistoricalFeatures {
            recent_form: mean_finish(stats.recent.iter().copied()),
            driver_win_rate: Some(stats.wins as f64 / races),
            dnf_rate: Some(stats.dnfs as f64 / races),
            driver_track_avg,
            team_track_avg,
            quali_strength: Some(stats.grid_sum / races),
        }
    }
}

fn mean_finish(finishes: impl Iterator<Item = Option<u8>>) -> Option<f64> {
    let (sum, count) = finishes
        .flatten()
        .fold((0.0, 0usize), |(s, c), f| (s + f as f64, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Feature engineering over a race-result table
pub struct FeatureEngineering;

impl FeatureEngineering {
    /// Derive features for every result
    ///
    /// Output rows keep the input order. Input does not need to be sorted;
    /// races are processed in race-id order internally.
    pub fn derive(results: &[RaceResult]) -> Vec<FeatureRow> {
        // Group row indices by race id, chronologically
        let mut races: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (i, r) in results.iter().enumerate() {
            races.entry(r.race_id).or_default().push(i);
        }

        let mut history = HistoryAccumulator::new();
        let mut rows: Vec<Option<FeatureRow>> = vec![None; results.len()];

        for indices in races.values() {
            for &i in indices {
                rows[i] = Some(Self::featurize(&history, &results[i]));
            }
            for &i in indices {
                history.observe(&results[i]);
            }
        }

        rows.into_iter().flatten().collect()
    }

    fn featurize(history: &HistoryAccumulator, result: &RaceResult) -> FeatureRow {
        let mut historical = history.features_for(&result.driver, &result.team, &result.track);

        // First race of a career: the form window is the race itself
        if history.race_count(&result.driver) == 0 {
            historical.recent_form = result.finish_position.map(|f| f as f64);
        }

        FeatureRow {
            position_change: Self::position_change(result),
            historical,
            result: result.clone(),
        }
    }

    /// Places gained from grid to finish
    pub fn position_change(result: &RaceResult) -> Option<f64> {
        result
            .finish_position
            .map(|finish| result.grid_position as f64 - finish as f64)
    }
}

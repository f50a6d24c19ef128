//! Driver History Index
//!
//! Folds a full result table into running aggregates so a race entry for an
//! upcoming race can be assembled from everything seen so far.

use std::collections::HashMap;

use crate::data::features::HistoryAccumulator;
use crate::models::{RaceEntry, RaceResult};

/// Aggregated history over a complete result table
pub struct DriverHistoryIndex {
    history: HistoryAccumulator,
    /// driver -> team of their latest race
    teams: HashMap<String, String>,
}

impl DriverHistoryIndex {
    pub fn from_results(results: &[RaceResult]) -> Self {
        let mut ordered: Vec<&RaceResult> = results.iter().collect();
        ordered.sort_by_key(|r| r.race_id);

        let mut history = HistoryAccumulator::new();
        let mut teams = HashMap::new();
        for result in ordered {
            history.observe(result);
            teams.insert(result.driver.clone(), result.team.clone());
        }

        Self { history, teams }
    }

    /// Latest known team for a driver
    pub fn team_of(&self, driver: &str) -> Option<&str> {
        self.teams.get(driver).map(String::as_str)
    }

    /// Build an entry for a driver's next race
    ///
    /// Returns `None` for a driver with no recorded races. Pair averages with
    /// no history fall back to the recent form.
    pub fn entry_for(
        &self,
        driver: &str,
        track: &str,
        grid_position: u8,
        weather: &str,
        temperature: f64,
    ) -> Option<RaceEntry> {
        let team = self.team_of(driver)?;
        let features = self.history.features_for(driver, team, track);
        let recent_form = features.recent_form.unwrap_or(grid_position as f64);

        Some(RaceEntry {
            driver: driver.to_string(),
            team: team.to_string(),
            track: track.to_string(),
            grid_position,
            recent_form,
            win_rate: features.driver_win_rate.unwrap_or(0.0),
            track_avg: features.driver_track_avg.unwrap_or(recent_form),
            team_rating: features.team_track_avg.unwrap_or(recent_form),
            weather: weather.to_string(),
            temperature,
            dnf_rate: features.dnf_rate,
            quali_strength: features.quali_strength,
        })
    }

    /// Number of drivers in the index
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader;
    use crate::models::Weather;

    fn result(race_id: u32, track: &str, finish: u8) -> RaceResult {
        RaceResult {
            race_id,
            year: 2024,
            track: track.to_string(),
            driver: "A".to_string(),
            team: "T1".to_string(),
            grid_position: 2,
            finish_position: Some(finish),
            points: 0.0,
            fastest_lap: false,
            dnf: false,
            weather: Weather::Dry,
            temperature: 25.0,
        }
    }

    #[test]
    fn test_entry_uses_full_history() {
        let results = vec![result(1, "Monza", 5), result(2, "Spa", 3), result(3, "Monza", 1)];
        let index = DriverHistoryIndex::from_results(&results);

        let entry = index.entry_for("A", "Monza", 4, "Dry", 26.0).unwrap();
        assert_eq!(entry.team, "T1");
        assert!((entry.recent_form - 3.0).abs() < 1e-12);
        assert!((entry.win_rate - 1.0 / 3.0).abs() < 1e-12);
        assert!((entry.track_avg - 3.0).abs() < 1e-12);
        assert_eq!(entry.dnf_rate, Some(0.0));
    }

    #[test]
    fn test_unvisited_track_falls_back_to_form() {
        let results = vec![result(1, "Monza", 5), result(2, "Spa", 3)];
        let index = DriverHistoryIndex::from_results(&results);

        let entry = index.entry_for("A", "Monaco", 4, "Dry", 26.0).unwrap();
        assert!((entry.track_avg - 4.0).abs() < 1e-12);
        assert!((entry.team_rating - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_driver() {
        let index = DriverHistoryIndex::from_results(&loader::load(42));
        assert_eq!(index.len(), 10);
        assert!(index.entry_for("Schumacher", "Monza", 1, "Dry", 25.0).is_none());
    }
}

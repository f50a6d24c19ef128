//! Synthetic Race History
//!
//! Seeded generator for a historical race-result table, used when no real
//! results file is available. The same seed always reproduces the same
//! table, row for row.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use crate::error::{PredictorError, Result};
use crate::models::{RaceResult, Weather, MAX_POSITION, MIN_POSITION};

/// Points awarded to the top ten classified finishers
const POINTS_TABLE: [f64; 10] = [25.0, 18.0, 15.0, 12.0, 10.0, 8.0, 6.0, 4.0, 2.0, 1.0];

/// Circuits in the generated calendar
const TRACKS: [&str; 5] = ["Abu Dhabi", "Monza", "Silverstone", "Monaco", "Spa"];

/// (driver, team, pace offset). Negative offset = faster than grid suggests.
const ROSTER: [(&str, &str, f64); 10] = [
    ("Verstappen", "Red Bull", -3.0),
    ("Perez", "Red Bull", 0.5),
    ("Hamilton", "Mercedes", -1.5),
    ("Russell", "Mercedes", -1.0),
    ("Leclerc", "Ferrari", -1.5),
    ("Sainz", "Ferrari", -1.0),
    ("Norris", "McLaren", -2.0),
    ("Piastri", "McLaren", -1.0),
    ("Alonso", "Aston Martin", -0.5),
    ("Stroll", "Aston Martin", 2.0),
];

/// Synthetic generator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Number of races in the history
    pub races: usize,
    /// Races per season before the year rolls over
    pub races_per_season: usize,
    pub start_year: u16,
    /// Probability of a dry race
    pub dry_probability: f64,
    /// Per-driver probability of retiring from a race
    pub dnf_probability: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            races: 30,
            races_per_season: 6,
            start_year: 2020,
            dry_probability: 0.8,
            dnf_probability: 0.15,
        }
    }
}

/// Seeded race-history generator
pub struct SyntheticRaceGenerator {
    config: SyntheticConfig,
}

impl SyntheticRaceGenerator {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    /// Generate the full result table, ordered by race id then driver
    pub fn load(&self, seed: u64) -> Vec<RaceResult> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut results = Vec::with_capacity(self.config.races * ROSTER.len());

        for race_id in 0..self.config.races {
            results.extend(self.generate_race(race_id as u32, &mut rng));
        }

        results.sort_by(|a, b| a.race_id.cmp(&b.race_id).then_with(|| a.driver.cmp(&b.driver)));

        info!(
            "Generated {} historical race results ({} races, seed {})",
            results.len(),
            self.config.races,
            seed
        );
        results
    }

    fn generate_race(&self, race_id: u32, rng: &mut StdRng) -> Vec<RaceResult> {
        let season = race_id as usize / self.config.races_per_season.max(1);
        let year = self.config.start_year + season as u16;
        let track = TRACKS[rng.gen_range(0..TRACKS.len())];
        let weather = if rng.gen_bool(self.config.dry_probability.clamp(0.0, 1.0)) {
            Weather::Dry
        } else {
            Weather::Wet
        };
        let temperature = rng.gen_range(20..35) as f64;

        // Grid is a permutation of 1..=N
        let mut grid: Vec<u8> = (1..=ROSTER.len() as u8).collect();
        grid.shuffle(rng);

        // Race pace: grid slot plus driver offset plus noise (doubled in the wet)
        let noise_scale = if weather == Weather::Wet { 8.0 } else { 4.0 };
        let mut pace: Vec<(usize, f64, bool)> = ROSTER
            .iter()
            .enumerate()
            .map(|(i, (_, _, offset))| {
                let noise = rng.gen_range(-0.5..0.5) * noise_scale;
                let dnf = rng.gen_bool(self.config.dnf_probability.clamp(0.0, 1.0));
                (i, grid[i] as f64 + offset + noise, dnf)
            })
            .collect();

        // Finishers first in pace order; retirements are unclassified
        pace.sort_by(|a, b| {
            a.2.cmp(&b.2)
                .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut finish = vec![None; ROSTER.len()];
        let mut classified = 0u8;
        for (idx, _, dnf) in &pace {
            if !dnf {
                classified += 1;
                finish[*idx] = Some(classified);
            }
        }

        let fastest_lap_idx = if classified > 0 {
            let pick = rng.gen_range(0..classified as usize);
            Some(pace[pick].0)
        } else {
            None
        };

        ROSTER
            .iter()
            .enumerate()
            .map(|(i, (driver, team, _))| {
                let points = finish[i]
                    .and_then(|p| POINTS_TABLE.get(p as usize - 1).copied())
                    .unwrap_or(0.0);
                RaceResult {
                    race_id,
                    year,
                    track: track.to_string(),
                    driver: driver.to_string(),
                    team: team.to_string(),
                    grid_position: grid[i],
                    finish_position: finish[i],
                    points,
                    fastest_lap: fastest_lap_idx == Some(i),
                    dnf: finish[i].is_none(),
                    weather,
                    temperature,
                }
            })
            .collect()
    }
}

impl Default for SyntheticRaceGenerator {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

/// Load the default synthetic history for a seed
pub fn load(seed: u64) -> Vec<RaceResult> {
    SyntheticRaceGenerator::default().load(seed)
}

/// Check position ranges and (driver, race) uniqueness
pub fn validate_results(results: &[RaceResult]) -> Result<()> {
    let mut seen = HashSet::with_capacity(results.len());

    for r in results {
        if !(MIN_POSITION..=MAX_POSITION).contains(&r.grid_position) {
            return Err(PredictorError::InvalidRecord(format!(
                "race {} driver {}: grid position {} out of range",
                r.race_id, r.driver, r.grid_position
            )));
        }
        if let Some(finish) = r.finish_position {
            if !(MIN_POSITION..=MAX_POSITION).contains(&finish) {
                return Err(PredictorError::InvalidRecord(format!(
                    "race {} driver {}: finish position {} out of range",
                    r.race_id, r.driver, finish
                )));
            }
        }
        if !seen.insert((r.driver.as_str(), r.race_id)) {
            return Err(PredictorError::InvalidRecord(format!(
                "duplicate result for driver {} in race {}",
                r.driver, r.race_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_table() {
        let a = load(42);
        let b = load(42);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seed_different_table() {
        assert_ne!(load(1), load(2));
    }

    #[test]
    fn test_default_size_and_order() {
        let results = load(42);
        assert_eq!(results.len(), 300);

        for pair in results.windows(2) {
            let key_a = (pair[0].race_id, pair[0].driver.as_str());
            let key_b = (pair[1].race_id, pair[1].driver.as_str());
            assert!(key_a < key_b);
        }
    }

    #[test]
    fn test_generated_results_are_valid() {
        let results = load(7);
        assert!(validate_results(&results).is_ok());

        for r in &results {
            assert_eq!(r.dnf, r.finish_position.is_none());
            assert!((20.0..35.0).contains(&r.temperature));
            if r.finish_position.is_none() {
                assert_eq!(r.points, 0.0);
                assert!(!r.fastest_lap);
            }
        }
    }

    #[test]
    fn test_each_race_has_unique_grid_and_finish() {
        let results = load(3);
        for race_id in 0..30u32 {
            let race: Vec<_> = results.iter().filter(|r| r.race_id == race_id).collect();
            assert_eq!(race.len(), ROSTER.len());

            let mut grid: Vec<u8> = race.iter().map(|r| r.grid_position).collect();
            grid.sort();
            assert_eq!(grid, (1..=10).collect::<Vec<u8>>());

            let mut finish: Vec<u8> = race.iter().filter_map(|r| r.finish_position).collect();
            finish.sort();
            let expected: Vec<u8> = (1..=finish.len() as u8).collect();
            assert_eq!(finish, expected);

            assert!(race.iter().filter(|r| r.fastest_lap).count() <= 1);
        }
    }

    #[test]
    fn test_year_rolls_over_by_season() {
        let results = load(42);
        assert_eq!(results.first().unwrap().year, 2020);
        assert_eq!(results.last().unwrap().year, 2024);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut results = load(42);
        results.push(results[0].clone());
        let err = validate_results(&results).unwrap_err();
        assert_eq!(err.kind(), "invalid_record");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut results = load(42);
        results[0].grid_position = 21;
        assert!(validate_results(&results).is_err());

        let mut results = load(42);
        results[0].finish_position = Some(0);
        assert!(validate_results(&results).is_err());
    }
}

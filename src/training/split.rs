//! Seeded train/test split

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{validate_test_fraction, PredictorError, Result};

/// Row indices on each side of a split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl TrainTestSplit {
    /// Shuffle `0..n` with a seeded RNG and hold out `ceil(n * test_fraction)` rows
    pub fn new(n: usize, test_fraction: f64, seed: u64) -> Result<Self> {
        validate_test_fraction(test_fraction)?;

        let test_len = (n as f64 * test_fraction).ceil() as usize;
        if n < 2 || test_len == 0 || test_len >= n {
            return Err(PredictorError::InsufficientData(format!(
                "cannot split {} rows with test fraction {}",
                n, test_fraction
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let train = indices.split_off(test_len);
        Ok(Self {
            train,
            test: indices,
        })
    }

    /// Pick the rows of `data` selected by `indices`
    pub fn select<T: Clone>(data: &[T], indices: &[usize]) -> Vec<T> {
        indices.iter().map(|&i| data[i].clone()).collect()
    }
}

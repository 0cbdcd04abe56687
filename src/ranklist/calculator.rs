//! Codeforces rating change calculation
//!
//! Computes, for a single contest's final standings, the rating delta the
//! platform would assign to every contestant.
//!
//! # Algorithm
//!
//! 1. Rank contestants by (points desc, penalty asc). Tied contestants share
//!    the rank of the first of them.
//! 2. Convolve the rating histogram with the Elo win probability via FFT to
//!    get the seed (expected rank) for every rating at once.
//! 3. For each contestant, binary search the rating whose seed equals the
//!    geometric mean of their rank and their own seed. Half the distance to
//!    that rating is the provisional delta.
//! 4. Apply a uniform correction so the sum is slightly negative, then a
//!    second one bounded to `[-10, 0]` computed over the top rated
//!    contestants.

use std::collections::HashMap;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

/// Ratings are folded into `[-MAX_RATING, MAX_RATING)` for the convolution
const MAX_RATING: i32 = 6144;
const TABLE_SIZE: usize = 2 * MAX_RATING as usize;

/// Binary search bounds for the performance rating
const SEARCH_LOW: i32 = 1;
const SEARCH_HIGH: i32 = 8000;

/// One line of final standings fed into the calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingEntry {
    pub party: String,
    pub points: f64,
    pub penalty: i64,
    pub rating: i32,
}

impl StandingEntry {
    pub fn new(party: impl Into<String>, points: f64, penalty: i64, rating: i32) -> Self {
        Self {
            party: party.into(),
            points,
            penalty,
            rating,
        }
    }
}

/// Per-contestant working state, exposed for inspection
#[derive(Debug, Clone, PartialEq)]
pub struct Contestant {
    pub party: String,
    pub points: f64,
    pub penalty: i64,
    pub rating: i32,
    pub rank: f64,
    pub seed: f64,
    pub need_rating: i32,
    pub delta: i32,
}

/// Rating calculator over one contest's standings
#[derive(Debug, Clone)]
pub struct RatingCalculator {
    contestants: Vec<Contestant>,
    win_prob: Vec<f64>,
    seed: Vec<f64>,
}

impl RatingCalculator {
    /// Run the full calculation over `standings`
    pub fn new<I>(standings: I) -> Self
    where
        I: IntoIterator<Item = StandingEntry>,
    {
        let contestants = standings
            .into_iter()
            .map(|entry| Contestant {
                party: entry.party,
                points: entry.points,
                penalty: entry.penalty,
                rating: entry.rating,
                rank: 0.0,
                seed: 0.0,
                need_rating: 0,
                delta: 0,
            })
            .collect();

        let mut calculator = Self {
            contestants,
            win_prob: win_probabilities(),
            seed: Vec::new(),
        };

        if calculator.contestants.is_empty() {
            return calculator;
        }

        calculator.precompute_seed();
        calculator.reassign_ranks();
        calculator.process();
        calculator.update_deltas();

        tracing::debug!(
            contestants = calculator.contestants.len(),
            "Rating changes calculated"
        );
        calculator
    }

    /// Party id to delta
    pub fn rating_changes(&self) -> HashMap<String, i32> {
        self.contestants
            .iter()
            .map(|c| (c.party.clone(), c.delta))
            .collect()
    }

    pub fn contestants(&self) -> &[Contestant] {
        &self.contestants
    }

    /// Expected rank of a hypothetical contestant rated `rating`.
    ///
    /// With `exclude` set, the contribution of a contestant with that rating
    /// is removed, which is how a contestant's own seed is computed.
    pub fn get_seed(&self, rating: i32, exclude: Option<i32>) -> f64 {
        let Some(&base) = self.seed.get(table_index(rating)) else {
            return 1.0;
        };
        match exclude {
            Some(own) => base - self.win_prob[table_index(rating - own)],
            None => base,
        }
    }

    fn precompute_seed(&mut self) {
        let mut count = vec![Complex::new(0.0, 0.0); TABLE_SIZE];
        for contestant in &self.contestants {
            count[table_index(contestant.rating)].re += 1.0;
        }
        let mut prob: Vec<Complex<f64>> =
            self.win_prob.iter().map(|&p| Complex::new(p, 0.0)).collect();

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(TABLE_SIZE);
        let inverse = planner.plan_fft_inverse(TABLE_SIZE);

        forward.process(&mut count);
        forward.process(&mut prob);
        let mut product: Vec<Complex<f64>> =
            count.iter().zip(&prob).map(|(a, b)| a * b).collect();
        inverse.process(&mut product);

        // rustfft leaves the inverse transform unnormalized
        let scale = TABLE_SIZE as f64;
        self.seed = product.iter().map(|c| 1.0 + c.re / scale).collect();
    }

    fn reassign_ranks(&mut self) {
        self.contestants.sort_by(|a, b| {
            b.points
                .total_cmp(&a.points)
                .then(a.penalty.cmp(&b.penalty))
        });

        let mut rank = 0.0;
        let mut previous: Option<(f64, i64)> = None;
        for i in 0..self.contestants.len() {
            let key = (self.contestants[i].points, self.contestants[i].penalty);
            if previous != Some(key) {
                rank = (i + 1) as f64;
                previous = Some(key);
            }
            self.contestants[i].rank = rank;
        }
    }

    fn process(&mut self) {
        for i in 0..self.contestants.len() {
            let rating = self.contestants[i].rating;
            let seed = self.get_seed(rating, Some(rating));
            let mid_rank = (self.contestants[i].rank * seed).sqrt();
            let need_rating = self.rank_to_rating(mid_rank, rating);

            let contestant = &mut self.contestants[i];
            contestant.seed = seed;
            contestant.need_rating = need_rating;
            contestant.delta = (need_rating - rating) / 2;
        }
    }

    fn rank_to_rating(&self, rank: f64, own_rating: i32) -> i32 {
        let (mut left, mut right) = (SEARCH_LOW, SEARCH_HIGH);
        while right - left > 1 {
            let mid = (left + right) / 2;
            if self.get_seed(mid, Some(own_rating)) < rank {
                right = mid;
            } else {
                left = mid;
            }
        }
        left
    }

    fn update_deltas(&mut self) {
        let n = self.contestants.len() as i32;
        self.contestants.sort_by(|a, b| b.rating.cmp(&a.rating));

        let sum: i32 = self.contestants.iter().map(|c| c.delta).sum();
        let correction = -sum / n - 1;
        for contestant in &mut self.contestants {
            contestant.delta += correction;
        }

        let zero_sum_count = ((4.0 * f64::from(n).sqrt().round()) as i32).min(n);
        let top_sum: i32 = self
            .contestants
            .iter()
            .take(zero_sum_count as usize)
            .map(|c| c.delta)
            .sum();
        let correction = (-top_sum / zero_sum_count).clamp(-10, 0);
        for contestant in &mut self.contestants {
            contestant.delta += correction;
        }
    }
}

/// `win_prob[d mod N]` is the chance a contestant rated `r + d` loses to one
/// rated `r`, for `d` in `[-MAX_RATING, MAX_RATING)`.
fn win_probabilities() -> Vec<f64> {
    (0..TABLE_SIZE as i32)
        .map(|k| {
            let diff = if k < MAX_RATING { k } else { k - TABLE_SIZE as i32 };
            1.0 / (1.0 + 10f64.powf(f64::from(diff) / 400.0))
        })
        .collect()
}

fn table_index(rating: i32) -> usize {
    rating.rem_euclid(TABLE_SIZE as i32) as usize
}

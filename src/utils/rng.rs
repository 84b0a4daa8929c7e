//! Seeded random number generation.
//!
//! Wraps a seedable `rand` generator so that weight initialisation, dropout masks,
//! action sampling and minibatch shuffling are reproducible from one seed.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng as _, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Reproducible RNG shared by the network and the agent.
#[derive(Clone, Debug)]
pub struct Rng {
    inner: StdRng,
}

impl Rng {
    /// Create a new RNG from an explicit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// Derives an independent generator, e.g. for a dropout layer's masks.
    pub fn fork(&mut self) -> Self {
        Self::new(self.inner.random::<u64>())
    }

    /// Uniform sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.inner.random::<f32>()
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        if high <= low {
            return low;
        }
        self.inner.random_range(low..high)
    }

    /// Integer sample in [0, upper).
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            self.inner.random_range(0..upper)
        }
    }

    /// Gaussian sample with the given mean and standard deviation.
    pub fn normal(&mut self, mean: f32, std_dev: f32) -> f32 {
        match Normal::new(mean, std_dev) {
            Ok(dist) => dist.sample(&mut self.inner),
            // Non-finite or negative deviation: fall back to the mean.
            Err(_) => mean,
        }
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, data: &mut [T]) {
        data.shuffle(&mut self.inner);
    }

    /// Returns a random permutation of `0..count`.
    pub fn permutation(&mut self, count: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..count).collect();
        self.shuffle(&mut indices);
        indices
    }
}

//! Running statistics for observation normalisation and reward scaling.

/// Added to the standard deviation before dividing.
pub const STD_EPSILON: f32 = 1e-8;

/// Welford estimator of per-dimension mean and population standard deviation.
///
/// The first sample sets `mean = v` and `std = |v|`: the magnitude keeps the
/// standard deviation non-negative for negative first samples.
#[derive(Debug, Clone)]
pub struct RunningMeanStd {
    n: usize,
    mean: Vec<f32>,
    sum_sq: Vec<f32>,
    std: Vec<f32>,
}

impl RunningMeanStd {
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: vec![0.0; dim],
            sum_sq: vec![0.0; dim],
            std: vec![0.0; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn count(&self) -> usize {
        self.n
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn std(&self) -> &[f32] {
        &self.std
    }

    pub fn update(&mut self, v: &[f32]) {
        debug_assert_eq!(v.len(), self.dim());
        self.n += 1;
        if self.n == 1 {
            self.mean.copy_from_slice(v);
            self.sum_sq.fill(0.0);
            for (std, &x) in self.std.iter_mut().zip(v) {
                *std = x.abs();
            }
            return;
        }

        let n = self.n as f32;
        for i in 0..self.dim() {
            let old = self.mean[i];
            self.mean[i] = old + (v[i] - old) / n;
            self.sum_sq[i] += (v[i] - old) * (v[i] - self.mean[i]);
            self.std[i] = (self.sum_sq[i] / n).sqrt();
        }
    }

    pub fn update_scalar(&mut self, v: f32) {
        self.update(&[v]);
    }

    pub fn reset(&mut self) {
        self.n = 0;
        self.mean.fill(0.0);
        self.sum_sq.fill(0.0);
        self.std.fill(0.0);
    }
}

/// Observation normaliser: updates statistics, then standardises in place.
#[derive(Debug, Clone)]
pub struct Normalization {
    stats: RunningMeanStd,
}

impl Normalization {
    pub fn new(dim: usize) -> Self {
        Self {
            stats: RunningMeanStd::new(dim),
        }
    }

    pub fn stats(&self) -> &RunningMeanStd {
        &self.stats
    }

    pub fn apply(&mut self, v: &mut [f32]) {
        self.stats.update(v);
        for ((x, &mean), &std) in v.iter_mut().zip(&self.stats.mean).zip(&self.stats.std) {
            *x = (*x - mean) / (std + STD_EPSILON);
        }
    }
}

/// Divides rewards by the running std of the discounted return.
///
/// The discounted return restarts from zero on [`RewardScaling::reset`], which
/// the agent calls at every episode boundary; the std statistics persist.
#[derive(Debug, Clone)]
pub struct RewardScaling {
    gamma: f32,
    ret: f32,
    stats: RunningMeanStd,
}

impl RewardScaling {
    pub fn new(gamma: f32) -> Self {
        Self {
            gamma,
            ret: 0.0,
            stats: RunningMeanStd::new(1),
        }
    }

    pub fn apply(&mut self, reward: f32) -> f32 {
        self.ret = self.gamma * self.ret + reward;
        self.stats.update_scalar(self.ret);
        reward / (self.stats.std[0] + STD_EPSILON)
    }

    /// Clears the discounted return, e.g. at an episode boundary.
    pub fn reset(&mut self) {
        self.ret = 0.0;
    }
}

impl Default for RewardScaling {
    fn default() -> Self {
        Self::new(0.99)
    }
}

//! Hyperparameters shared by every optimizer instance of a network.

/// Values set once per training step for all parameter tensors.
///
/// `epoch` is the Adam time step and starts at 1; a value of 0 would make the
/// bias correction divide by zero, so it is clamped to at least 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hyperparams {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    pub epoch: u32,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            epoch: 1,
        }
    }
}

impl Hyperparams {
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_epoch(mut self, epoch: u32) -> Self {
        self.epoch = epoch;
        self
    }
}

/// Resolved scalars handed to each update kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateStep {
    pub learning_rate: f32,
    /// `lr · sqrt(1 − β2^t) / (1 − β1^t)`
    pub corrected_learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl UpdateStep {
    fn resolve(params: &Hyperparams) -> Self {
        let t = params.epoch.max(1) as i32;
        let corrected_learning_rate = params.learning_rate
            * (1.0 - params.beta2.powi(t)).sqrt()
            / (1.0 - params.beta1.powi(t));
        Self {
            learning_rate: params.learning_rate,
            corrected_learning_rate,
            beta1: params.beta1,
            beta2: params.beta2,
            epsilon: params.epsilon,
        }
    }
}

impl Default for UpdateStep {
    fn default() -> Self {
        Self::resolve(&Hyperparams::default())
    }
}

/// Memoizes the resolved step so it is recomputed only when a value changes.
#[derive(Debug, Default)]
pub struct HyperparamCache {
    current: Option<Hyperparams>,
    step: UpdateStep,
    recomputes: usize,
}

impl HyperparamCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `params`. Returns `true` when the resolved step changed.
    pub fn set(&mut self, params: Hyperparams) -> bool {
        if self.current == Some(params) {
            return false;
        }
        self.step = UpdateStep::resolve(&params);
        self.current = Some(params);
        self.recomputes += 1;
        true
    }

    pub fn step(&self) -> &UpdateStep {
        &self.step
    }

    pub fn current(&self) -> Option<&Hyperparams> {
        self.current.as_ref()
    }

    /// How many times the step has been resolved.
    pub fn recompute_count(&self) -> usize {
        self.recomputes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_corrected_learning_rate() {
        let params = Hyperparams::default().with_epoch(2);
        let step = UpdateStep::resolve(&params);
        let expected = 0.001 * (1.0f32 - 0.999f32.powi(2)).sqrt() / (1.0 - 0.9f32.powi(2));
        assert_relative_eq!(step.corrected_learning_rate, expected, max_relative = 1e-6);
    }

    #[test]
    fn test_epoch_zero_is_clamped() {
        let zero = UpdateStep::resolve(&Hyperparams::default().with_epoch(0));
        let one = UpdateStep::resolve(&Hyperparams::default().with_epoch(1));
        assert!(zero.corrected_learning_rate.is_finite());
        assert_eq!(zero, one);
    }

    #[test]
    fn test_cache_skips_identical_values() {
        let mut cache = HyperparamCache::new();
        assert!(cache.set(Hyperparams::default()));
        assert!(!cache.set(Hyperparams::default()));
        assert_eq!(cache.recompute_count(), 1);
        assert!(cache.set(Hyperparams::default().with_learning_rate(0.01)));
        assert_eq!(cache.recompute_count(), 2);
    }
}

//! Stochastic Gradient Descent (SGD) optimizer implementation
//!
//! This module provides a vanilla SGD optimizer that performs the basic
//! gradient descent update: `parameter = parameter - learning_rate * gradient`

use rayon::prelude::*;

use crate::config::OptimizerKind;
use crate::optimizers::{check_lengths, Optimizer, UpdateStep};

/// Stochastic Gradient Descent optimizer.
///
/// `w = w - η * ∇L/∂w`
///
/// Stateless; the step size comes from [`UpdateStep::learning_rate`].
#[derive(Debug, Default)]
pub struct Sgd;

impl Sgd {
    pub fn new() -> Self {
        Self
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32], step: &UpdateStep) {
        check_lengths(parameters, gradients, 0);
        let lr = step.learning_rate;
        parameters
            .par_iter_mut()
            .zip(gradients.par_iter())
            .for_each(|(param, &grad)| *param -= lr * grad);
    }

    fn reset(&mut self) {}

    fn kind(&self) -> OptimizerKind {
        OptimizerKind::Sgd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::{HyperparamCache, Hyperparams};
    use approx::assert_relative_eq;

    fn step(lr: f32) -> UpdateStep {
        let mut cache = HyperparamCache::new();
        cache.set(Hyperparams::default().with_learning_rate(lr));
        *cache.step()
    }

    #[test]
    fn test_sgd_update() {
        let mut optimizer = Sgd::new();
        let mut params = vec![1.0, 2.0, 3.0];
        optimizer.update(&mut params, &[0.1, 0.2, 0.3], &step(0.1));

        assert_relative_eq!(params[0], 0.99, epsilon = 1e-6);
        assert_relative_eq!(params[1], 1.98, epsilon = 1e-6);
        assert_relative_eq!(params[2], 2.97, epsilon = 1e-6);
    }

    #[test]
    fn test_sgd_zero_learning_rate() {
        let mut optimizer = Sgd::new();
        let mut params = vec![1.0, 2.0];
        optimizer.update(&mut params, &[5.0, -5.0], &step(0.0));
        assert_eq!(params, vec![1.0, 2.0]);
    }

    #[test]
    #[should_panic(expected = "Parameters and gradients must have the same length")]
    fn test_sgd_mismatched_lengths() {
        let mut optimizer = Sgd::new();
        let mut params = vec![1.0, 2.0, 3.0];
        optimizer.update(&mut params, &[0.1, 0.2], &step(0.1));
    }
}

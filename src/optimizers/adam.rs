//! Adam (Adaptive Moment Estimation) optimizer implementation
//!
//! This module provides the Adam optimizer, which combines momentum and
//! adaptive learning rates with bias correction for improved convergence.

use rayon::prelude::*;

use crate::config::OptimizerKind;
use crate::optimizers::{check_lengths, Optimizer, UpdateStep};

/// Adam (Adaptive Moment Estimation) optimizer.
///
/// The bias correction is folded into the step size, which the network
/// resolves once per step for all tensors:
///
/// ```text
/// m_t  = m + (1 - β1) * (g - m)
/// v_t  = v + (1 - β2) * (g² - v)
/// lr_t = α * √(1 - β2^t) / (1 - β1^t)
/// parameter = parameter - lr_t * m_t / (√v_t + ε)
/// ```
///
/// # Example
///
/// ```
/// use neural_ppo::optimizers::{Adam, HyperparamCache, Hyperparams, Optimizer};
///
/// let mut cache = HyperparamCache::new();
/// cache.set(Hyperparams::default());
///
/// let mut optimizer = Adam::new(3);
/// let mut weights = vec![1.0, 2.0, 3.0];
/// optimizer.update(&mut weights, &[0.1, 0.2, 0.3], cache.step());
/// assert!(weights[0] < 1.0);
/// ```
///
/// # Reference
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
/// arXiv preprint arXiv:1412.6980.
#[derive(Debug)]
pub struct Adam {
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Adam {
    pub fn new(len: usize) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }

    /// First moment estimates.
    pub fn first_moment(&self) -> &[f32] {
        &self.m
    }

    /// Second moment estimates.
    pub fn second_moment(&self) -> &[f32] {
        &self.v
    }
}

impl Optimizer for Adam {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32], step: &UpdateStep) {
        check_lengths(parameters, gradients, self.m.len());
        let UpdateStep {
            corrected_learning_rate: lr_t,
            beta1,
            beta2,
            epsilon,
            ..
        } = *step;

        parameters
            .par_iter_mut()
            .zip(self.m.par_iter_mut().zip(self.v.par_iter_mut()))
            .zip(gradients.par_iter())
            .for_each(|((param, (m, v)), &grad)| {
                *m += (1.0 - beta1) * (grad - *m);
                *v += (1.0 - beta2) * (grad * grad - *v);
                *param -= lr_t * *m / (v.sqrt() + epsilon);
            });
    }

    fn reset(&mut self) {
        self.m.fill(0.0);
        self.v.fill(0.0);
    }

    fn kind(&self) -> OptimizerKind {
        OptimizerKind::Adam
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::{HyperparamCache, Hyperparams};
    use approx::assert_relative_eq;

    fn step(epoch: u32) -> UpdateStep {
        let mut cache = HyperparamCache::new();
        cache.set(Hyperparams::default().with_epoch(epoch).with_epsilon(1e-8));
        *cache.step()
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut optimizer = Adam::new(3);
        let mut params = vec![1.0, 2.0, 3.0];
        optimizer.update(&mut params, &[0.5, -2.0, 0.01], &step(1));

        assert_relative_eq!(params[0], 1.0 - 0.001, epsilon = 1e-5);
        assert_relative_eq!(params[1], 2.0 + 0.001, epsilon = 1e-5);
        assert_relative_eq!(params[2], 3.0 - 0.001, epsilon = 1e-5);
    }

    #[test]
    fn test_adam_state_persistence() {
        let mut optimizer = Adam::new(1);
        let mut params = vec![0.0];
        optimizer.update(&mut params, &[1.0], &step(1));
        assert_relative_eq!(optimizer.first_moment()[0], 0.1, epsilon = 1e-6);
        optimizer.update(&mut params, &[1.0], &step(2));
        assert_relative_eq!(optimizer.first_moment()[0], 0.19, epsilon = 1e-6);
        assert_relative_eq!(optimizer.second_moment()[0], 0.001999, epsilon = 1e-6);
    }

    #[test]
    fn test_adam_reset() {
        let mut optimizer = Adam::new(2);
        let mut params = vec![1.0, 1.0];
        optimizer.update(&mut params, &[1.0, 1.0], &step(1));
        optimizer.reset();
        assert_eq!(optimizer.first_moment(), &[0.0, 0.0]);
        assert_eq!(optimizer.second_moment(), &[0.0, 0.0]);
    }
}

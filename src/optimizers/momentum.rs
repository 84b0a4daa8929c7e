//! Velocity-based optimizers: classical momentum and Nesterov momentum.
//!
//! Both keep one velocity buffer per tensor and use `β1` as the momentum
//! factor.

use rayon::prelude::*;

use crate::config::OptimizerKind;
use crate::optimizers::{check_lengths, Optimizer, UpdateStep};

/// Classical momentum.
///
/// ```text
/// v = β1 · v − lr · g
/// w = w + v
/// ```
#[derive(Debug)]
pub struct Momentum {
    velocity: Vec<f32>,
}

impl Momentum {
    pub fn new(len: usize) -> Self {
        Self {
            velocity: vec![0.0; len],
        }
    }

    pub fn velocity(&self) -> &[f32] {
        &self.velocity
    }
}

impl Optimizer for Momentum {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32], step: &UpdateStep) {
        check_lengths(parameters, gradients, self.velocity.len());
        let (lr, beta1) = (step.learning_rate, step.beta1);
        parameters
            .par_iter_mut()
            .zip(self.velocity.par_iter_mut())
            .zip(gradients.par_iter())
            .for_each(|((param, v), &grad)| {
                *v = beta1 * *v - lr * grad;
                *param += *v;
            });
    }

    fn reset(&mut self) {
        self.velocity.fill(0.0);
    }

    fn kind(&self) -> OptimizerKind {
        OptimizerKind::Momentum
    }
}

/// Nesterov accelerated gradient in the look-ahead form.
///
/// ```text
/// v = β1 · v − lr · g
/// w = w + β1² · v − (1 + β1) · lr · g
/// ```
#[derive(Debug)]
pub struct Nesterov {
    velocity: Vec<f32>,
}

impl Nesterov {
    pub fn new(len: usize) -> Self {
        Self {
            velocity: vec![0.0; len],
        }
    }
}

impl Optimizer for Nesterov {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32], step: &UpdateStep) {
        check_lengths(parameters, gradients, self.velocity.len());
        let (lr, beta1) = (step.learning_rate, step.beta1);
        parameters
            .par_iter_mut()
            .zip(self.velocity.par_iter_mut())
            .zip(gradients.par_iter())
            .for_each(|((param, v), &grad)| {
                *v = beta1 * *v - lr * grad;
                *param += beta1 * beta1 * *v - (1.0 + beta1) * lr * grad;
            });
    }

    fn reset(&mut self) {
        self.velocity.fill(0.0);
    }

    fn kind(&self) -> OptimizerKind {
        OptimizerKind::Nesterov
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::{HyperparamCache, Hyperparams};
    use approx::assert_relative_eq;

    fn step() -> UpdateStep {
        let mut cache = HyperparamCache::new();
        cache.set(Hyperparams::default().with_learning_rate(0.1));
        *cache.step()
    }

    #[test]
    fn test_momentum_accumulates_velocity() {
        let mut optimizer = Momentum::new(1);
        let mut params = vec![0.0];
        optimizer.update(&mut params, &[1.0], &step());
        assert_relative_eq!(params[0], -0.1, epsilon = 1e-6);
        optimizer.update(&mut params, &[1.0], &step());
        // v = 0.9 · (−0.1) − 0.1 = −0.19
        assert_relative_eq!(optimizer.velocity()[0], -0.19, epsilon = 1e-6);
        assert_relative_eq!(params[0], -0.29, epsilon = 1e-6);
    }

    #[test]
    fn test_nesterov_first_step() {
        let mut optimizer = Nesterov::new(1);
        let mut params = vec![0.0];
        optimizer.update(&mut params, &[1.0], &step());
        // 0.81 · (−0.1) − 1.9 · 0.1
        assert_relative_eq!(params[0], -0.271, epsilon = 1e-6);
    }

    #[test]
    fn test_reset_clears_velocity() {
        let mut optimizer = Momentum::new(2);
        let mut params = vec![0.0, 0.0];
        optimizer.update(&mut params, &[1.0, 1.0], &step());
        optimizer.reset();
        assert_eq!(optimizer.velocity(), &[0.0, 0.0]);
    }
}

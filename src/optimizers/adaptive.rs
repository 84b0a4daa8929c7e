//! Per-parameter adaptive learning rates from squared-gradient statistics.

use rayon::prelude::*;

use crate::config::OptimizerKind;
use crate::optimizers::{check_lengths, Optimizer, UpdateStep};

/// AdaGrad: `h += g²`, `w -= lr · g / (sqrt(h) + ε)`.
#[derive(Debug)]
pub struct AdaGrad {
    squares: Vec<f32>,
}

impl AdaGrad {
    pub fn new(len: usize) -> Self {
        Self {
            squares: vec![0.0; len],
        }
    }
}

impl Optimizer for AdaGrad {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32], step: &UpdateStep) {
        check_lengths(parameters, gradients, self.squares.len());
        let (lr, eps) = (step.learning_rate, step.epsilon);
        parameters
            .par_iter_mut()
            .zip(self.squares.par_iter_mut())
            .zip(gradients.par_iter())
            .for_each(|((param, h), &grad)| {
                *h += grad * grad;
                *param -= lr * grad / (h.sqrt() + eps);
            });
    }

    fn reset(&mut self) {
        self.squares.fill(0.0);
    }

    fn kind(&self) -> OptimizerKind {
        OptimizerKind::AdaGrad
    }
}

/// RMSprop with decay `β2`: `h = β2 · h + (1 − β2) · g²`,
/// `w -= lr · g / (sqrt(h) + ε)`.
#[derive(Debug)]
pub struct RmsProp {
    mean_square: Vec<f32>,
}

impl RmsProp {
    pub fn new(len: usize) -> Self {
        Self {
            mean_square: vec![0.0; len],
        }
    }
}

impl Optimizer for RmsProp {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32], step: &UpdateStep) {
        check_lengths(parameters, gradients, self.mean_square.len());
        let (lr, decay, eps) = (step.learning_rate, step.beta2, step.epsilon);
        parameters
            .par_iter_mut()
            .zip(self.mean_square.par_iter_mut())
            .zip(gradients.par_iter())
            .for_each(|((param, h), &grad)| {
                *h = decay * *h + (1.0 - decay) * grad * grad;
                *param -= lr * grad / (h.sqrt() + eps);
            });
    }

    fn reset(&mut self) {
        self.mean_square.fill(0.0);
    }

    fn kind(&self) -> OptimizerKind {
        OptimizerKind::RmsProp
    }
}

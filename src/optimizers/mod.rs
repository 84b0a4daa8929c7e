//! Optimizer abstractions for neural network parameter updates
//!
//! This module provides the Optimizer trait and the update rules used by linear
//! layers. Every rule mutates one parameter tensor in place from its raw
//! gradient; a linear layer owns one optimizer for its weights and one for its
//! bias.
//!
//! # Available Optimizers
//!
//! - SGD: Vanilla stochastic gradient descent
//! - Momentum / Nesterov: velocity-based descent (first-moment buffer)
//! - AdaGrad: accumulated squared gradients (second-moment buffer)
//! - RMSprop: decaying squared gradients (first-moment buffer)
//! - Adam: both moments with bias correction
//!
//! Scalars such as the learning rate are not stored per instance. The network
//! resolves one [`UpdateStep`] per training step through a [`HyperparamCache`]
//! and passes it to every update.
//!
//! # Example
//!
//! ```
//! use neural_ppo::config::OptimizerKind;
//! use neural_ppo::optimizers::{build_optimizer, HyperparamCache, Hyperparams};
//!
//! let mut cache = HyperparamCache::new();
//! cache.set(Hyperparams::default().with_learning_rate(0.1));
//!
//! let mut optimizer = build_optimizer(OptimizerKind::Sgd, 2);
//! let mut weights = vec![1.0, 2.0];
//! optimizer.update(&mut weights, &[1.0, -1.0], cache.step());
//! assert_eq!(weights, vec![0.9, 2.1]);
//! ```

pub mod adam;
pub mod adaptive;
pub mod hyper;
pub mod momentum;
pub mod sgd;

pub use adam::Adam;
pub use adaptive::{AdaGrad, RmsProp};
pub use hyper::{HyperparamCache, Hyperparams, UpdateStep};
pub use momentum::{Momentum, Nesterov};
pub use sgd::Sgd;

use crate::config::OptimizerKind;

/// Core trait for parameter update rules.
///
/// # State Management
///
/// Stateful rules keep moment buffers shaped like the tensor they update,
/// allocated when the optimizer is built.
pub trait Optimizer: Send {
    /// Applies one update to `parameters` in place.
    ///
    /// # Panics
    ///
    /// Panics if parameters, gradients and state have different lengths.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32], step: &UpdateStep);

    /// Zeroes any moment buffers.
    fn reset(&mut self);

    fn kind(&self) -> OptimizerKind;
}

/// Builds the optimizer for one tensor of `len` parameters.
pub fn build_optimizer(kind: OptimizerKind, len: usize) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Sgd => Box::new(Sgd::new()),
        OptimizerKind::Momentum => Box::new(Momentum::new(len)),
        OptimizerKind::Nesterov => Box::new(Nesterov::new(len)),
        OptimizerKind::AdaGrad => Box::new(AdaGrad::new(len)),
        OptimizerKind::RmsProp => Box::new(RmsProp::new(len)),
        OptimizerKind::Adam => Box::new(Adam::new(len)),
    }
}

fn check_lengths(parameters: &[f32], gradients: &[f32], state: usize) {
    assert_eq!(
        parameters.len(),
        gradients.len(),
        "Parameters and gradients must have the same length"
    );
    assert!(
        state == 0 || state == parameters.len(),
        "optimizer state holds {} values for {} parameters",
        state,
        parameters.len()
    );
}

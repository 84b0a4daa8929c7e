//! Dropout layer implementation for regularization
//!
//! This module provides a Dropout layer that randomly drops (sets to zero) a fraction
//! of input units during training to prevent overfitting. During inference, all units
//! are kept and outputs are passed through unchanged.

use rayon::prelude::*;

use crate::layers::{BackwardPass, Feed, InitContext, Layer, LayerKind};
use crate::tensor::TensorBuffer;
use crate::utils::Rng;

/// Default probability of dropping a unit.
pub const DEFAULT_DROP_RATE: f32 = 0.1;

/// Dropout layer for regularization.
///
/// During training, randomly sets a fraction of input units to zero with probability
/// `drop_rate`, and scales the remaining units by 1/(1-drop_rate) to maintain expected
/// values. During inference, passes inputs through unchanged.
///
/// A fresh mask is drawn on every training forward pass; backward multiplies the
/// upstream gradient by that same mask.
///
/// # Example
///
/// ```
/// use neural_ppo::layers::Dropout;
///
/// let mut layer = Dropout::new(0.5);
/// layer.set_training(false);
/// assert_eq!(layer.drop_rate(), 0.5);
/// ```
pub struct Dropout {
    drop_rate: f32,
    node_count: Option<usize>,
    training: bool,
    output: TensorBuffer,
    mask: TensorBuffer,
    rng: Rng,
}

impl Dropout {
    /// Creates a dropout layer.
    ///
    /// # Panics
    ///
    /// Panics if `drop_rate` is outside `[0.0, 1.0)`.
    pub fn new(drop_rate: f32) -> Self {
        assert!(
            (0.0..1.0).contains(&drop_rate),
            "drop_rate must be in range [0.0, 1.0)"
        );
        Self {
            drop_rate,
            node_count: None,
            training: true,
            output: TensorBuffer::new("dropout.output", 0),
            mask: TensorBuffer::new("dropout.mask", 0),
            rng: Rng::new(0),
        }
    }

    /// Switches between masking (training) and identity (inference).
    ///
    /// `init` sets this from the network type; call it afterwards to evaluate a
    /// training network without dropout.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn drop_rate(&self) -> f32 {
        self.drop_rate
    }

    /// Mask of the last training forward pass: 0 or `1/(1-drop_rate)` per unit.
    pub fn mask(&self) -> &[f32] {
        self.mask.as_slice()
    }
}

impl Default for Dropout {
    fn default() -> Self {
        Self::new(DEFAULT_DROP_RATE)
    }
}

impl Layer for Dropout {
    fn kind(&self) -> LayerKind {
        LayerKind::Dropout
    }

    fn node_count(&self) -> Option<usize> {
        self.node_count
    }

    fn init(&mut self, ctx: InitContext<'_>) {
        let len = ctx.max_batch * ctx.prev_node_count;
        self.node_count = Some(ctx.prev_node_count);
        self.training = ctx.config.is_train();
        self.output = TensorBuffer::new("dropout.output", len);
        self.mask = TensorBuffer::new("dropout.mask", len);
        self.rng = ctx.rng.fork();
    }

    fn forward(&mut self, feed: Feed<'_>) {
        let len = feed.batch * self.node_count.unwrap_or(0);
        let input = &feed.input[..len];
        let output = &mut self.output.as_mut_slice()[..len];

        if !self.training {
            output.copy_from_slice(input);
            return;
        }

        let scale = 1.0 / (1.0 - self.drop_rate);
        let mask = &mut self.mask.as_mut_slice()[..len];
        for m in mask.iter_mut() {
            *m = if self.rng.next_f32() < self.drop_rate {
                0.0
            } else {
                scale
            };
        }
        output
            .par_iter_mut()
            .zip(input.par_iter().zip(mask.par_iter()))
            .for_each(|(out, (&x, &m))| *out = x * m);
    }

    fn backward(&mut self, pass: BackwardPass<'_>) {
        let len = pass.feed.batch * self.node_count.unwrap_or(0);
        let swap = pass.swap;
        let d_input = &mut swap.d_input.as_mut_slice()[..len];
        let d_output = &swap.d_output.as_slice()[..len];

        if !self.training {
            d_input.copy_from_slice(d_output);
            return;
        }

        let mask = &self.mask.as_slice()[..len];
        d_input
            .par_iter_mut()
            .zip(d_output.par_iter().zip(mask.par_iter()))
            .for_each(|(d_in, (&g, &m))| *d_in = g * m);
    }

    fn output(&self) -> &[f32] {
        self.output.as_slice()
    }

    fn release(&mut self) {
        self.output.release();
        self.mask.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetConfig, NetType};

    fn init_layer(layer: &mut Dropout, net_type: NetType, width: usize, batch: usize) {
        let config = NetConfig {
            net_type,
            ..NetConfig::default()
        };
        let mut rng = Rng::new(7);
        layer.init(InitContext {
            config: &config,
            prev_node_count: width,
            max_batch: batch,
            rng: &mut rng,
        });
    }

    #[test]
    #[should_panic(expected = "drop_rate must be in range [0.0, 1.0)")]
    fn test_dropout_invalid_rate_too_high() {
        Dropout::new(1.0);
    }

    #[test]
    fn test_default_rate() {
        assert_eq!(Dropout::default().drop_rate(), DEFAULT_DROP_RATE);
    }

    #[test]
    fn test_predict_mode_is_identity() {
        let mut layer = Dropout::new(0.5);
        init_layer(&mut layer, NetType::Predict, 4, 1);
        let input = [1.0, 2.0, 3.0, 4.0];
        layer.forward(Feed {
            input: &input,
            target: &[],
            batch: 1,
        });
        assert_eq!(&layer.output()[..4], &input);
    }

    #[test]
    fn test_training_mask_values() {
        let mut layer = Dropout::new(0.5);
        init_layer(&mut layer, NetType::Train, 100, 2);
        let input = vec![1.0f32; 200];
        layer.forward(Feed {
            input: &input,
            target: &[],
            batch: 2,
        });
        for (&out, &m) in layer.output().iter().zip(layer.mask()) {
            assert!(m == 0.0 || m == 2.0);
            assert_eq!(out, m);
        }
        let kept = layer.mask().iter().filter(|&&m| m > 0.0).count();
        assert!(kept > 50 && kept < 150, "kept {kept} of 200");
    }
}

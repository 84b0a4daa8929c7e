//! Linear (fully connected) layer implementation
//!
//! This module provides a Linear layer that performs the transformation:
//! output = input × weights + biases

use crate::config::InitKind;
use crate::kernels;
use crate::layers::{BackwardPass, Feed, InitContext, Layer, LayerKind};
use crate::optimizers::{build_optimizer, Optimizer, UpdateStep};
use crate::tensor::TensorBuffer;
use crate::utils::Rng;

/// Linear layer with weights and biases.
///
/// Performs the linear transformation: y = xW + b
/// where x is the input (batch_size × input_count),
/// W is the weight matrix (input_count × node_count),
/// and b is the bias vector (node_count).
///
/// Parameter gradients are summed over the batch; the loss gradient already
/// carries the `1/batch` factor.
///
/// # Example
///
/// ```
/// use neural_ppo::layers::{Layer, Linear};
///
/// let layer = Linear::new(64);
/// assert_eq!(layer.node_count(), Some(64));
/// ```
pub struct Linear {
    node_count: usize,
    input_count: usize,
    output: TensorBuffer,
    weight: TensorBuffer,
    bias: TensorBuffer,
    /// Own gradients, present only when clipping defers the update.
    grads: Option<(TensorBuffer, TensorBuffer)>,
    /// Weight and bias optimizers, present only in train mode.
    optimizers: Option<(Box<dyn Optimizer>, Box<dyn Optimizer>)>,
}

impl Linear {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            input_count: 0,
            output: TensorBuffer::new("linear.output", 0),
            weight: TensorBuffer::new("linear.weight", 0),
            bias: TensorBuffer::new("linear.bias", 0),
            grads: None,
            optimizers: None,
        }
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn weight_len(&self) -> usize {
        self.input_count * self.node_count
    }

    pub fn bias_len(&self) -> usize {
        self.node_count
    }

    /// input_count × node_count weights plus node_count biases.
    pub fn parameter_count(&self) -> usize {
        self.weight_len() + self.bias_len()
    }

    /// Row-major `input_count × node_count` weights.
    pub fn weights(&self) -> &[f32] {
        self.weight.as_slice()
    }

    pub fn weights_mut(&mut self) -> &mut [f32] {
        self.weight.as_mut_slice()
    }

    pub fn bias(&self) -> &[f32] {
        self.bias.as_slice()
    }

    pub fn bias_mut(&mut self) -> &mut [f32] {
        self.bias.as_mut_slice()
    }

    /// Weight and bias gradients held for a deferred (clipped) update.
    pub fn gradients(&self) -> Option<(&[f32], &[f32])> {
        self.grads
            .as_ref()
            .map(|(dw, db)| (dw.as_slice(), db.as_slice()))
    }

    pub fn gradients_mut(&mut self) -> Option<(&mut [f32], &mut [f32])> {
        self.grads
            .as_mut()
            .map(|(dw, db)| (dw.as_mut_slice(), db.as_mut_slice()))
    }

    /// Applies the optimizer to the held gradients. No-op without them.
    pub fn apply_pending_update(&mut self, step: &UpdateStep) {
        let (Some((dw, db)), Some((weight_opt, bias_opt))) =
            (self.grads.as_ref(), self.optimizers.as_mut())
        else {
            return;
        };
        weight_opt.update(self.weight.as_mut_slice(), dw.as_slice(), step);
        bias_opt.update(self.bias.as_mut_slice(), db.as_slice(), step);
    }
}

/// Fills `weight` according to `kind`; `InitKind::None` leaves it untouched.
pub fn initialize_weights(weight: &mut [f32], kind: InitKind, fan_in: usize, rng: &mut Rng) {
    let fan_in = fan_in.max(1) as f32;
    match kind {
        InitKind::Random => {
            let scale = 1.0 / fan_in.sqrt();
            for value in weight.iter_mut() {
                *value = rng.gen_range_f32(-scale, scale);
            }
        }
        InitKind::Xavier => {
            let std_dev = 1.0 / fan_in.sqrt();
            for value in weight.iter_mut() {
                *value = rng.normal(0.0, std_dev);
            }
        }
        InitKind::He => {
            let std_dev = (2.0 / fan_in).sqrt();
            for value in weight.iter_mut() {
                *value = rng.normal(0.0, std_dev);
            }
        }
        InitKind::None => {}
    }
}

impl Layer for Linear {
    fn kind(&self) -> LayerKind {
        LayerKind::Linear
    }

    fn node_count(&self) -> Option<usize> {
        Some(self.node_count)
    }

    fn init(&mut self, ctx: InitContext<'_>) {
        let InitContext {
            config,
            prev_node_count,
            max_batch,
            rng,
        } = ctx;
        self.input_count = prev_node_count;
        let weight_len = self.weight_len();

        self.output = TensorBuffer::new("linear.output", max_batch * self.node_count);
        self.weight = TensorBuffer::new("linear.weight", weight_len);
        self.bias = TensorBuffer::new("linear.bias", self.node_count);

        if config.is_train() {
            self.optimizers = Some((
                build_optimizer(config.optimizer, weight_len),
                build_optimizer(config.optimizer, self.node_count),
            ));
            initialize_weights(self.weight.as_mut_slice(), config.init, prev_node_count, rng);
            if config.clip_grad {
                self.grads = Some((
                    TensorBuffer::new("linear.d_weight", weight_len),
                    TensorBuffer::new("linear.d_bias", self.node_count),
                ));
            }
        }
    }

    fn forward(&mut self, feed: Feed<'_>) {
        kernels::linear_forward(
            feed.input,
            self.weight.as_slice(),
            self.bias.as_slice(),
            self.output.as_mut_slice(),
            feed.batch,
            self.input_count,
            self.node_count,
        );
    }

    fn backward(&mut self, pass: BackwardPass<'_>) {
        let BackwardPass { feed, swap, step } = pass;
        let (batch, n_in, n_out) = (feed.batch, self.input_count, self.node_count);

        kernels::linear_backward_input(
            swap.d_output.as_slice(),
            self.weight.as_slice(),
            swap.d_input.as_mut_slice(),
            batch,
            n_in,
            n_out,
        );

        if let Some((dw, db)) = self.grads.as_mut() {
            kernels::linear_grads(
                swap.d_output.as_slice(),
                feed.input,
                dw.as_mut_slice(),
                db.as_mut_slice(),
                batch,
                n_in,
                n_out,
            );
            return;
        }

        let (Some(dw), Some(db)) = (swap.d_weight.as_mut(), swap.d_bias.as_mut()) else {
            panic!("linear backward needs either own gradients or swap scratch");
        };
        let (dw, db) = (dw.as_mut_slice(), db.as_mut_slice());
        kernels::linear_grads(swap.d_output.as_slice(), feed.input, dw, db, batch, n_in, n_out);

        if let Some((weight_opt, bias_opt)) = self.optimizers.as_mut() {
            weight_opt.update(self.weight.as_mut_slice(), &dw[..n_in * n_out], step);
            bias_opt.update(self.bias.as_mut_slice(), &db[..n_out], step);
        }
    }

    fn output(&self) -> &[f32] {
        self.output.as_slice()
    }

    fn release(&mut self) {
        self.output.release();
        self.weight.release();
        self.bias.release();
        if let Some((dw, db)) = self.grads.as_mut() {
            dw.release();
            db.release();
        }
        self.optimizers = None;
    }

    fn as_linear(&self) -> Option<&Linear> {
        Some(self)
    }

    fn as_linear_mut(&mut self) -> Option<&mut Linear> {
        Some(self)
    }
}

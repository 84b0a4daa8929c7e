//! Terminal loss layer.
//!
//! Forward writes one loss value per batch row; backward writes the gradient of
//! the batch-mean loss with respect to the predecessor's output.

use rayon::prelude::*;

use crate::config::LossKind;
use crate::layers::{BackwardPass, Feed, InitContext, Layer, LayerKind};
use crate::tensor::TensorBuffer;

/// Floor applied to predicted probabilities before taking the log.
pub const CROSS_ENTROPY_FLOOR: f32 = 1e-7;

/// Loss appended after the last layer.
///
/// - MSE: `loss_b = mean_i (y − t)²`, `dL/dy = 2(y − t) / (count · batch)`
/// - CrossEntropy over probabilities: `loss_b = −Σ t · ln(max(y, 1e-7))`,
///   `dL/dy = −t / (max(y, 1e-7) · batch)`
///
/// `LossKind::None` yields zero loss and zero gradient.
pub struct LossLayer {
    loss: LossKind,
    node_count: Option<usize>,
    output: TensorBuffer,
}

impl LossLayer {
    pub fn new(loss: LossKind) -> Self {
        Self {
            loss,
            node_count: None,
            output: TensorBuffer::new("loss.output", 0),
        }
    }

    pub fn loss_kind(&self) -> LossKind {
        self.loss
    }

    /// Mean of the per-row losses of the last forward pass.
    pub fn mean_loss(&self, batch: usize) -> f32 {
        if batch == 0 {
            return 0.0;
        }
        self.output.as_slice()[..batch].iter().sum::<f32>() / batch as f32
    }
}

fn row_loss(loss: LossKind, y: &[f32], t: &[f32]) -> f32 {
    match loss {
        LossKind::Mse => {
            let sum: f32 = y.iter().zip(t).map(|(&yi, &ti)| (yi - ti) * (yi - ti)).sum();
            sum / y.len().max(1) as f32
        }
        LossKind::CrossEntropy => -y
            .iter()
            .zip(t)
            .map(|(&yi, &ti)| ti * yi.max(CROSS_ENTROPY_FLOOR).ln())
            .sum::<f32>(),
        LossKind::None => 0.0,
    }
}

fn row_gradient(loss: LossKind, y: &[f32], t: &[f32], batch: usize, out: &mut [f32]) {
    let batch = batch as f32;
    match loss {
        LossKind::Mse => {
            let scale = 2.0 / (y.len() as f32 * batch);
            for ((o, &yi), &ti) in out.iter_mut().zip(y).zip(t) {
                *o = scale * (yi - ti);
            }
        }
        LossKind::CrossEntropy => {
            for ((o, &yi), &ti) in out.iter_mut().zip(y).zip(t) {
                *o = -ti / (yi.max(CROSS_ENTROPY_FLOOR) * batch);
            }
        }
        LossKind::None => out.fill(0.0),
    }
}

impl Layer for LossLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Loss
    }

    fn node_count(&self) -> Option<usize> {
        self.node_count
    }

    fn init(&mut self, ctx: InitContext<'_>) {
        self.node_count = Some(ctx.prev_node_count);
        self.output = TensorBuffer::new("loss.output", ctx.max_batch);
    }

    fn forward(&mut self, feed: Feed<'_>) {
        let width = self.node_count.unwrap_or(0);
        if width == 0 {
            return;
        }
        let loss = self.loss;
        self.output.as_mut_slice()[..feed.batch]
            .par_iter_mut()
            .zip(feed.input.par_chunks(width))
            .zip(feed.target.par_chunks(width))
            .for_each(|((out, y), t)| *out = row_loss(loss, y, t));
    }

    fn backward(&mut self, pass: BackwardPass<'_>) {
        let width = self.node_count.unwrap_or(0);
        if width == 0 {
            return;
        }
        let loss = self.loss;
        let Feed {
            input,
            target,
            batch,
        } = pass.feed;
        pass.swap.d_input.as_mut_slice()[..batch * width]
            .par_chunks_mut(width)
            .zip(input.par_chunks(width))
            .zip(target.par_chunks(width))
            .for_each(|((out, y), t)| row_gradient(loss, y, t, batch, out));
    }

    fn output(&self) -> &[f32] {
        self.output.as_slice()
    }

    fn release(&mut self) {
        self.output.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mse_row_loss() {
        let loss = row_loss(LossKind::Mse, &[1.0, 3.0], &[0.0, 1.0]);
        assert_relative_eq!(loss, 2.5);
    }

    #[test]
    fn test_mse_gradient_scaled_by_count_and_batch() {
        let mut out = [0.0; 2];
        row_gradient(LossKind::Mse, &[1.0, 3.0], &[0.0, 1.0], 4, &mut out);
        assert_relative_eq!(out[0], 2.0 * 1.0 / 8.0);
        assert_relative_eq!(out[1], 2.0 * 2.0 / 8.0);
    }

    #[test]
    fn test_cross_entropy_clamps_zero_probability() {
        let loss = row_loss(LossKind::CrossEntropy, &[0.0, 1.0], &[1.0, 0.0]);
        assert_relative_eq!(loss, -(1e-7f32).ln(), max_relative = 1e-6);
        let mut out = [0.0; 2];
        row_gradient(LossKind::CrossEntropy, &[0.0, 1.0], &[1.0, 0.0], 1, &mut out);
        assert!(out[0].is_finite());
        assert_eq!(out[1], 0.0);
    }
}

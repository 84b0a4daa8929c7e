//! Global-norm gradient clipping.
//!
//! The squared L2 norm of every gradient tensor is reduced with repeated
//! group-sum passes over two ping-pong scratch buffers; the per-tensor results
//! are combined into one global norm and all tensors are rescaled by
//! `min(1, max_norm / (norm + 1e-6))`.

use crate::kernels::{self, REDUCTION_GROUP_SIZE};
use crate::tensor::TensorBuffer;

const NORM_EPSILON: f32 = 1e-6;

/// Reusable reduction state for one network's parameter gradients.
#[derive(Debug)]
pub struct GradientClipper {
    ping: TensorBuffer,
    pong: TensorBuffer,
    /// Sum of squares per tensor, in the order passed to [`clip`](Self::clip).
    results: Vec<f32>,
    last_norm: f32,
    last_coef: f32,
}

impl GradientClipper {
    /// Sizes scratch for tensors of the given lengths.
    pub fn new(tensor_lens: &[usize]) -> Self {
        let largest = tensor_lens.iter().copied().max().unwrap_or(0);
        let scratch = largest.div_ceil(REDUCTION_GROUP_SIZE).max(1);
        Self {
            ping: TensorBuffer::new("clip.ping", scratch),
            pong: TensorBuffer::new("clip.pong", scratch),
            results: vec![0.0; tensor_lens.len()],
            last_norm: 0.0,
            last_coef: 1.0,
        }
    }

    /// Sum of squares of `data` by tree reduction.
    pub fn square_sum(&mut self, data: &[f32]) -> f32 {
        if data.is_empty() {
            return 0.0;
        }
        let needed = data.len().div_ceil(REDUCTION_GROUP_SIZE);
        if self.ping.len() < needed {
            self.ping = TensorBuffer::new("clip.ping", needed);
            self.pong = TensorBuffer::new("clip.pong", needed);
        }

        let mut src = &mut self.ping;
        let mut dst = &mut self.pong;
        let mut remaining = kernels::square_sum_pass(data, src.as_mut_slice(), true);
        while remaining > 1 {
            remaining =
                kernels::square_sum_pass(&src.as_slice()[..remaining], dst.as_mut_slice(), false);
            std::mem::swap(&mut src, &mut dst);
        }
        src.as_slice()[0]
    }

    /// Rescales `grads` jointly so their global L2 norm is at most `max_norm`.
    ///
    /// Returns the applied coefficient (1 when no clipping was needed).
    pub fn clip(&mut self, grads: &mut [&mut [f32]], max_norm: f32) -> f32 {
        if self.results.len() != grads.len() {
            self.results.resize(grads.len(), 0.0);
        }
        for (i, grad) in grads.iter().enumerate() {
            self.results[i] = self.square_sum(grad);
        }

        let total: f32 = self.results.iter().sum();
        let norm = total.sqrt();
        let coef = (max_norm / (norm + NORM_EPSILON)).min(1.0);
        self.last_norm = norm;
        self.last_coef = coef;

        if coef < 1.0 {
            for grad in grads.iter_mut() {
                kernels::scale_in_place(grad, coef);
            }
        }
        coef
    }

    /// Global norm measured by the last [`clip`](Self::clip) call.
    pub fn last_norm(&self) -> f32 {
        self.last_norm
    }

    pub fn last_coef(&self) -> f32 {
        self.last_coef
    }

    /// Per-tensor sums of squares from the last call.
    pub fn results(&self) -> &[f32] {
        &self.results
    }

    pub fn release(&mut self) {
        self.ping.release();
        self.pong.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn norm(grads: &[Vec<f32>]) -> f32 {
        grads
            .iter()
            .flat_map(|g| g.iter())
            .map(|v| v * v)
            .sum::<f32>()
            .sqrt()
    }

    #[test]
    fn test_square_sum_multi_pass() {
        // Needs three passes: 300_000 -> 586 -> 2 -> 1.
        let data = vec![0.5f32; 300_000];
        let mut clipper = GradientClipper::new(&[data.len()]);
        assert_relative_eq!(clipper.square_sum(&data), 75_000.0, max_relative = 1e-4);
    }

    #[test]
    fn test_clip_scales_to_max_norm() {
        let mut a = vec![3.0f32; 1000];
        let mut b = vec![-4.0f32; 10];
        let mut clipper = GradientClipper::new(&[a.len(), b.len()]);
        {
            let mut grads: Vec<&mut [f32]> = vec![a.as_mut_slice(), b.as_mut_slice()];
            let coef = clipper.clip(&mut grads, 0.5);
            assert!(coef < 1.0);
        }
        assert_relative_eq!(norm(&[a, b]), 0.5, epsilon = 1e-4);
        assert_eq!(clipper.results().len(), 2);
    }

    #[test]
    fn test_small_gradients_unchanged() {
        let mut a = vec![0.01f32, -0.02, 0.03];
        let original = a.clone();
        let mut clipper = GradientClipper::new(&[a.len()]);
        let coef = clipper.clip(&mut [a.as_mut_slice()], 1.0);
        assert_eq!(coef, 1.0);
        assert_eq!(a, original);
    }
}

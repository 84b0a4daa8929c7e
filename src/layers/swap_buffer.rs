//! Gradient buffers shared by every layer of one network.

use crate::tensor::TensorBuffer;

/// Two interchangeable gradient buffers plus optional parameter-gradient
/// scratch.
///
/// During backward each layer reads `d_output`, writes `d_input`, and the
/// network then calls [`swap`](Self::swap) so the previous layer sees the
/// freshly written gradient as its own `d_output`.
///
/// The `d_weight`/`d_bias` scratch exists only when gradient clipping is off:
/// a linear layer then computes its parameter gradients here and applies them
/// immediately, so one scratch serves the whole chain.
#[derive(Debug)]
pub struct LayerSwapBuffer {
    pub(crate) d_input: TensorBuffer,
    pub(crate) d_output: TensorBuffer,
    pub(crate) d_weight: Option<TensorBuffer>,
    pub(crate) d_bias: Option<TensorBuffer>,
}

impl LayerSwapBuffer {
    /// `max_batch × max_width` gradient buffers, with `max_width²` weight scratch
    /// unless `with_scratch` is false.
    pub fn new(max_batch: usize, max_width: usize, with_scratch: bool) -> Self {
        let len = max_batch * max_width;
        Self {
            d_input: TensorBuffer::new("swap.d_input", len),
            d_output: TensorBuffer::new("swap.d_output", len),
            d_weight: with_scratch
                .then(|| TensorBuffer::new("swap.d_weight", max_width * max_width)),
            d_bias: with_scratch.then(|| TensorBuffer::new("swap.d_bias", max_width)),
        }
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.d_input, &mut self.d_output);
    }

    /// Gradient flowing into the layer currently walking backward.
    pub fn d_output(&self) -> &[f32] {
        self.d_output.as_slice()
    }

    /// Entry point for externally computed loss gradients.
    pub fn d_output_mut(&mut self) -> &mut [f32] {
        self.d_output.as_mut_slice()
    }

    pub fn d_input(&self) -> &[f32] {
        self.d_input.as_slice()
    }

    pub fn has_scratch(&self) -> bool {
        self.d_weight.is_some()
    }

    pub fn release(&mut self) {
        self.d_input.release();
        self.d_output.release();
        if let Some(buffer) = self.d_weight.as_mut() {
            buffer.release();
        }
        if let Some(buffer) = self.d_bias.as_mut() {
            buffer.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_exchanges_roles() {
        let mut swap = LayerSwapBuffer::new(1, 2, false);
        swap.d_input.upload(&[1.0, 2.0]);
        swap.swap();
        assert_eq!(swap.d_output(), &[1.0, 2.0]);
        assert_eq!(swap.d_input(), &[0.0, 0.0]);
        assert!(!swap.has_scratch());
    }

    #[test]
    fn test_scratch_sizes() {
        let swap = LayerSwapBuffer::new(4, 3, true);
        assert_eq!(swap.d_output().len(), 12);
        assert_eq!(swap.d_weight.as_ref().map(|b| b.len()), Some(9));
        assert_eq!(swap.d_bias.as_ref().map(|b| b.len()), Some(3));
    }
}

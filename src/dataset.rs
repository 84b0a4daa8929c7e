//! Batched input/target storage consumed by the first and loss layers.

use crate::tensor::TensorBuffer;

/// Input and target buffers for one network, sized for the largest batch.
///
/// `batch_size` may change between steps but never beyond the capacity
/// chosen at construction.
#[derive(Debug)]
pub struct Dataset {
    batch_size: usize,
    max_batch_size: usize,
    input_count: usize,
    output_count: usize,
    input: TensorBuffer,
    output: TensorBuffer,
}

impl Dataset {
    /// Allocates `max_batch_size × input_count` inputs and
    /// `max_batch_size × output_count` targets.
    pub fn new(max_batch_size: usize, input_count: usize, output_count: usize) -> Self {
        Self {
            batch_size: max_batch_size,
            max_batch_size,
            input_count,
            output_count,
            input: TensorBuffer::new("dataset.input", max_batch_size * input_count),
            output: TensorBuffer::new("dataset.output", max_batch_size * output_count),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Changes the active batch size.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size` exceeds the capacity the dataset was built with.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        assert!(
            batch_size <= self.max_batch_size,
            "batch size {} exceeds dataset capacity {}",
            batch_size,
            self.max_batch_size
        );
        self.batch_size = batch_size;
    }

    pub fn input(&self) -> &[f32] {
        self.input.as_slice()
    }

    pub fn input_mut(&mut self) -> &mut [f32] {
        self.input.as_mut_slice()
    }

    pub fn output(&self) -> &[f32] {
        self.output.as_slice()
    }

    pub fn output_mut(&mut self) -> &mut [f32] {
        self.output.as_mut_slice()
    }

    /// Copies host inputs into the front of the input buffer.
    pub fn upload_input(&mut self, data: &[f32]) {
        self.input.upload(data);
    }

    /// Copies host targets into the front of the target buffer.
    pub fn upload_output(&mut self, data: &[f32]) {
        self.output.upload(data);
    }

    pub fn release(&mut self) {
        self.input.release();
        self.output.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_capacity() {
        let mut dataset = Dataset::new(8, 4, 2);
        assert_eq!(dataset.input().len(), 32);
        assert_eq!(dataset.output().len(), 16);
        dataset.set_batch_size(3);
        assert_eq!(dataset.batch_size(), 3);
        assert_eq!(dataset.max_batch_size(), 8);
    }

    #[test]
    #[should_panic(expected = "exceeds dataset capacity")]
    fn test_batch_size_beyond_capacity_panics() {
        let mut dataset = Dataset::new(2, 1, 1);
        dataset.set_batch_size(3);
    }
}

//! Named, fixed-capacity float buffers.
//!
//! A [`TensorBuffer`] plays the role of a device-side buffer: it is allocated once
//! with the largest size it will ever need, written by host uploads or kernels,
//! and read back with an explicit [`TensorBuffer::download`]. The lifetime is
//! explicit: [`TensorBuffer::release`] frees the storage and any later access is
//! a programmer error that panics.

use std::fmt;

/// Contiguous `f32` storage with a debug name and explicit release.
///
/// Kernels usually touch only a prefix of the buffer (`batch × width` for the
/// current batch), so the capacity must cover the largest batch ever used.
///
/// # Example
///
/// ```
/// use neural_ppo::tensor::TensorBuffer;
///
/// let mut buffer = TensorBuffer::new("weights", 4);
/// buffer.upload(&[1.0, 2.0]);
/// let mut host = [0.0f32; 2];
/// buffer.download(&mut host);
/// assert_eq!(host, [1.0, 2.0]);
/// ```
#[derive(Clone)]
pub struct TensorBuffer {
    name: String,
    data: Vec<f32>,
    released: bool,
}

impl TensorBuffer {
    /// Allocates a zero-filled buffer holding `len` floats.
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            data: vec![0.0; len],
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity in floats.
    pub fn len(&self) -> usize {
        self.check_live();
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Copies `src` into the start of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `src` is longer than the buffer capacity.
    pub fn upload(&mut self, src: &[f32]) {
        self.check_live();
        assert!(
            src.len() <= self.data.len(),
            "upload into `{}` overflows capacity: {} > {}",
            self.name,
            src.len(),
            self.data.len()
        );
        self.data[..src.len()].copy_from_slice(src);
    }

    /// Copies the first `dst.len()` floats back to the host.
    ///
    /// This is the synchronisation point between kernels and host code.
    pub fn download(&self, dst: &mut [f32]) {
        self.check_live();
        assert!(
            dst.len() <= self.data.len(),
            "download from `{}` overflows capacity: {} > {}",
            self.name,
            dst.len(),
            self.data.len()
        );
        dst.copy_from_slice(&self.data[..dst.len()]);
    }

    /// Reads back the first `len` floats into a new vector.
    pub fn to_vec(&self, len: usize) -> Vec<f32> {
        let mut host = vec![0.0; len];
        self.download(&mut host);
        host
    }

    pub fn fill(&mut self, value: f32) {
        self.check_live();
        self.data.fill(value);
    }

    pub fn as_slice(&self) -> &[f32] {
        self.check_live();
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.check_live();
        &mut self.data
    }

    /// Frees the storage. Releasing twice panics.
    pub fn release(&mut self) {
        assert!(!self.released, "buffer `{}` released twice", self.name);
        self.data = Vec::new();
        self.released = true;
    }

    fn check_live(&self) {
        assert!(!self.released, "buffer `{}` used after release", self.name);
    }
}

impl fmt::Debug for TensorBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorBuffer")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_download_prefix() {
        let mut buffer = TensorBuffer::new("data", 6);
        buffer.upload(&[1.0, 2.0, 3.0]);
        assert_eq!(buffer.to_vec(4), vec![1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "overflows capacity")]
    fn test_upload_overflow_panics() {
        let mut buffer = TensorBuffer::new("small", 2);
        buffer.upload(&[1.0, 2.0, 3.0]);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn test_double_release_panics() {
        let mut buffer = TensorBuffer::new("once", 2);
        buffer.release();
        buffer.release();
    }

    #[test]
    #[should_panic(expected = "used after release")]
    fn test_use_after_release_panics() {
        let mut buffer = TensorBuffer::new("gone", 2);
        buffer.release();
        buffer.fill(1.0);
    }
}

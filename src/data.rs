//! Fixed-width raw image records.
//!
//! Each record is one label byte followed by `28 × 28` grayscale pixel bytes,
//! the layout of the Fashion-MNIST binary dumps. Batches are sliced straight
//! out of the raw bytes into a network's dataset buffers.

use std::fs;
use std::path::Path;

use rayon::prelude::*;

use crate::error::{NnError, Result};
use crate::utils::{argmax, Rng};

pub const PIXEL_COUNT: usize = 28 * 28;
/// Label byte plus pixels.
pub const RECORD_LEN: usize = 1 + PIXEL_COUNT;

pub const FASHION_MNIST_CLASSES: [&str; 10] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle boot",
];

/// An in-memory block of raw records.
#[derive(Debug, Clone)]
pub struct RawRecords {
    bytes: Vec<u8>,
    record_len: usize,
}

impl RawRecords {
    /// Wraps `bytes`; trailing bytes that do not fill a record are dropped.
    pub fn from_bytes(mut bytes: Vec<u8>, record_len: usize) -> Result<Self> {
        if record_len < 2 {
            return Err(NnError::Config(format!(
                "record length must hold a label and at least one pixel, got {record_len}"
            )));
        }
        bytes.truncate(bytes.len() / record_len * record_len);
        Ok(Self { bytes, record_len })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(fs::read(path)?, RECORD_LEN)
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.record_len
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn record_len(&self) -> usize {
        self.record_len
    }

    pub fn pixel_count(&self) -> usize {
        self.record_len - 1
    }

    /// Number of whole batches of `batch` records.
    pub fn batch_count(&self, batch: usize) -> usize {
        self.len().checked_div(batch).unwrap_or(0)
    }

    pub fn label(&self, index: usize) -> u8 {
        self.bytes[index * self.record_len]
    }

    fn batch_records(&self, batch_index: usize, batch: usize) -> &[u8] {
        let start = batch_index * batch * self.record_len;
        &self.bytes[start..start + batch * self.record_len]
    }

    /// Writes the pixels of batch `batch_index`, scaled to `[0, 1]`, as
    /// `batch × pixel_count` inputs.
    pub fn transform_to_input(&self, batch_index: usize, batch: usize, out: &mut [f32]) {
        let pixels = self.pixel_count();
        out[..batch * pixels]
            .par_chunks_mut(pixels)
            .zip(self.batch_records(batch_index, batch).par_chunks(self.record_len))
            .for_each(|(row, record)| {
                for (o, &p) in row.iter_mut().zip(&record[1..]) {
                    *o = p as f32 / 255.0;
                }
            });
    }

    /// Writes one-hot targets of width `classes` for batch `batch_index`.
    pub fn transform_to_output(&self, batch_index: usize, batch: usize, classes: usize, out: &mut [f32]) {
        out[..batch * classes]
            .par_chunks_mut(classes)
            .zip(self.batch_records(batch_index, batch).par_chunks(self.record_len))
            .for_each(|(row, record)| {
                row.fill(0.0);
                if let Some(slot) = row.get_mut(record[0] as usize) {
                    *slot = 1.0;
                }
            });
    }

    /// Permutes whole records in place.
    pub fn shuffle(&mut self, rng: &mut Rng) {
        let order = rng.permutation(self.len());
        let mut shuffled = Vec::with_capacity(self.bytes.len());
        for index in order {
            let start = index * self.record_len;
            shuffled.extend_from_slice(&self.bytes[start..start + self.record_len]);
        }
        self.bytes = shuffled;
    }
}

/// Predicted class of every row of a `rows × classes` output.
pub fn predict_indices(output: &[f32], classes: usize) -> Vec<usize> {
    output.chunks(classes.max(1)).map(argmax).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> RawRecords {
        // Three 4-byte records: label + 3 pixels, plus 2 stray bytes.
        let bytes = vec![2, 0, 255, 51, 0, 10, 20, 30, 1, 1, 2, 3, 9, 9];
        RawRecords::from_bytes(bytes, 4).unwrap()
    }

    #[test]
    fn test_partial_record_dropped() {
        let raw = records();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw.batch_count(2), 1);
    }

    #[test]
    fn test_input_scaled() {
        let raw = records();
        let mut out = vec![0.0; 3];
        raw.transform_to_input(0, 1, &mut out);
        assert_eq!(out, vec![0.0, 1.0, 0.2]);
    }

    #[test]
    fn test_output_one_hot() {
        let raw = records();
        let mut out = vec![9.0; 9];
        raw.transform_to_output(0, 3, 3, &mut out);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_shuffle_keeps_records_whole() {
        let mut raw = records();
        raw.shuffle(&mut Rng::new(5));
        let mut labels: Vec<u8> = (0..raw.len()).map(|i| raw.label(i)).collect();
        labels.sort_unstable();
        assert_eq!(labels, vec![0, 1, 2]);
    }

    #[test]
    fn test_predict_indices() {
        assert_eq!(predict_indices(&[0.1, 0.7, 0.2, 0.5, 0.4, 0.1], 3), vec![1, 0]);
    }
}

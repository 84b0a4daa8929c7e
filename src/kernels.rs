//! Data-parallel CPU kernels.
//!
//! Each function is one "dispatch" over a batch: rows are processed in parallel
//! with rayon and the caller observes the result only after the call returns.
//! Buffers are row-major, `batch × width`, and only the first `batch` rows are
//! touched so callers can pass oversized (max-batch) buffers.

use rayon::prelude::*;

/// Elements reduced by one work group in [`square_sum_pass`] (256 lanes × 2).
pub const REDUCTION_GROUP_SIZE: usize = 512;

/// `output[b, o] = Σ_i input[b, i] · weight[i, o] + bias[o]`
pub fn linear_forward(
    input: &[f32],
    weight: &[f32],
    bias: &[f32],
    output: &mut [f32],
    batch: usize,
    input_count: usize,
    output_count: usize,
) {
    output[..batch * output_count]
        .par_chunks_mut(output_count)
        .enumerate()
        .for_each(|(b, row)| {
            let x = &input[b * input_count..(b + 1) * input_count];
            row.copy_from_slice(&bias[..output_count]);
            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                let w = &weight[i * output_count..(i + 1) * output_count];
                for (out, &wio) in row.iter_mut().zip(w) {
                    *out += xi * wio;
                }
            }
        });
}

/// `d_input[b, i] = Σ_o d_output[b, o] · weight[i, o]`
pub fn linear_backward_input(
    d_output: &[f32],
    weight: &[f32],
    d_input: &mut [f32],
    batch: usize,
    input_count: usize,
    output_count: usize,
) {
    d_input[..batch * input_count]
        .par_chunks_mut(input_count)
        .enumerate()
        .for_each(|(b, row)| {
            let dy = &d_output[b * output_count..(b + 1) * output_count];
            for (i, d_in) in row.iter_mut().enumerate() {
                let w = &weight[i * output_count..(i + 1) * output_count];
                *d_in = dy.iter().zip(w).map(|(&g, &wio)| g * wio).sum();
            }
        });
}

/// Parameter gradients summed over the batch:
/// `d_weight[i, o] = Σ_b input[b, i] · d_output[b, o]`, `d_bias[o] = Σ_b d_output[b, o]`.
#[allow(clippy::too_many_arguments)]
pub fn linear_grads(
    d_output: &[f32],
    input: &[f32],
    d_weight: &mut [f32],
    d_bias: &mut [f32],
    batch: usize,
    input_count: usize,
    output_count: usize,
) {
    d_weight[..input_count * output_count]
        .par_chunks_mut(output_count)
        .enumerate()
        .for_each(|(i, row)| {
            row.fill(0.0);
            for b in 0..batch {
                let xi = input[b * input_count + i];
                if xi == 0.0 {
                    continue;
                }
                let dy = &d_output[b * output_count..(b + 1) * output_count];
                for (dw, &g) in row.iter_mut().zip(dy) {
                    *dw += xi * g;
                }
            }
        });

    d_bias[..output_count]
        .par_iter_mut()
        .enumerate()
        .for_each(|(o, db)| {
            *db = (0..batch).map(|b| d_output[b * output_count + o]).sum();
        });
}

/// Applies `op(input_row, output_row)` to each of the first `batch` rows.
pub fn map_rows<F>(input: &[f32], output: &mut [f32], batch: usize, width: usize, op: F)
where
    F: Fn(&[f32], &mut [f32]) + Sync + Send,
{
    output[..batch * width]
        .par_chunks_mut(width)
        .zip(input[..batch * width].par_chunks(width))
        .for_each(|(out, inp)| op(inp, out));
}

/// Elementwise `data[k] *= factor` over the whole slice.
pub fn scale_in_place(data: &mut [f32], factor: f32) {
    data.par_iter_mut().for_each(|value| *value *= factor);
}

/// One tree-reduction pass: each group of [`REDUCTION_GROUP_SIZE`] consecutive
/// inputs collapses into a single output. The first pass squares its inputs.
///
/// Returns the number of partial sums written to `output`.
pub fn square_sum_pass(input: &[f32], output: &mut [f32], square: bool) -> usize {
    let groups = input.len().div_ceil(REDUCTION_GROUP_SIZE);
    output[..groups]
        .par_iter_mut()
        .zip(input.par_chunks(REDUCTION_GROUP_SIZE))
        .for_each(|(partial, chunk)| {
            *partial = if square {
                chunk.iter().map(|&v| v * v).sum()
            } else {
                chunk.iter().sum()
            };
        });
    groups
}

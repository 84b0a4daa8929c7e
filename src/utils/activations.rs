//! Activation functions and their derivatives.
//!
//! Scalar forms are used by the activation layer kernels; the derivative helpers
//! take whichever of the pre-activation `x` or the output `y` is cheaper.

/// Negative-side slope for Leaky ReLU.
pub const LEAKY_RELU_SLOPE: f32 = 0.01;

pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// ReLU derivative from the pre-activation value.
pub fn relu_derivative(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

pub fn leaky_relu(x: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        LEAKY_RELU_SLOPE * x
    }
}

pub fn leaky_relu_derivative(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else {
        LEAKY_RELU_SLOPE
    }
}

/// Sigmoid activation: 1 / (1 + exp(-x)).
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Sigmoid derivative assuming y = sigmoid(x).
pub fn sigmoid_derivative(y: f32) -> f32 {
    y * (1.0 - y)
}

/// Tanh derivative assuming y = tanh(x).
pub fn tanh_derivative(y: f32) -> f32 {
    1.0 - y * y
}

/// Softmax of one row, written into `output`.
///
/// Uses the max-subtraction trick for numerical stability to avoid overflow
/// with large values.
pub fn softmax_row(input: &[f32], output: &mut [f32]) {
    if input.is_empty() {
        return;
    }
    let max_value = input.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0f32;
    for (out, &x) in output.iter_mut().zip(input) {
        *out = (x - max_value).exp();
        sum += *out;
    }

    let inv_sum = 1.0f32 / sum;
    for out in output.iter_mut() {
        *out *= inv_sum;
    }
}

/// Softmax applied row-wise in place.
///
/// # Arguments
/// * `outputs` - Flat array containing row-major matrix data
/// * `rows` - Number of rows in the matrix
/// * `cols` - Number of columns in the matrix
pub fn softmax_rows(outputs: &mut [f32], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    for row in outputs.chunks_exact_mut(cols).take(rows) {
        let input = row.to_vec();
        softmax_row(&input, row);
    }
}

/// Vector-Jacobian product of softmax for one row:
/// `dx_j = y_j · (dy_j − Σ_i dy_i · y_i)`.
pub fn softmax_row_backward(y: &[f32], dy: &[f32], dx: &mut [f32]) {
    let dot: f32 = y.iter().zip(dy).map(|(&yi, &gi)| yi * gi).sum();
    for ((d, &yj), &gj) in dx.iter_mut().zip(y).zip(dy) {
        *d = yj * (gj - dot);
    }
}

/// Index of the largest value in `row` (first wins on ties).
pub fn argmax(row: &[f32]) -> usize {
    let mut max_index = 0;
    let mut max_value = f32::NEG_INFINITY;
    for (i, &value) in row.iter().enumerate() {
        if value > max_value {
            max_value = value;
            max_index = i;
        }
    }
    max_index
}

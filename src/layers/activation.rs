//! Elementwise and row-wise activation layers.
//!
//! Every (activation, direction) pair maps to one row kernel in a fixed table;
//! the layer dispatches that kernel over the batch rows in parallel.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::layers::{BackwardPass, Feed, InitContext, Layer, LayerKind};
use crate::tensor::TensorBuffer;
use crate::utils::activations::{
    leaky_relu, leaky_relu_derivative, relu, relu_derivative, sigmoid, sigmoid_derivative,
    softmax_row, softmax_row_backward, tanh_derivative,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    Relu,
    Softmax,
    Sigmoid,
    Tanh,
    LeakyRelu,
}

impl ActivationKind {
    pub const ALL: [ActivationKind; 5] = [
        ActivationKind::Relu,
        ActivationKind::Softmax,
        ActivationKind::Sigmoid,
        ActivationKind::Tanh,
        ActivationKind::LeakyRelu,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Row views handed to a kernel.
///
/// Forward kernels read `input` only. Backward kernels read the forward
/// `input`, the forward `output` and the upstream `grad`.
pub struct RowArgs<'a> {
    pub input: &'a [f32],
    pub output: &'a [f32],
    pub grad: &'a [f32],
}

pub type RowKernel = fn(&RowArgs<'_>, &mut [f32]);

fn relu_forward(args: &RowArgs<'_>, out: &mut [f32]) {
    for (o, &x) in out.iter_mut().zip(args.input) {
        *o = relu(x);
    }
}

fn relu_backward(args: &RowArgs<'_>, out: &mut [f32]) {
    for ((o, &x), &g) in out.iter_mut().zip(args.input).zip(args.grad) {
        *o = g * relu_derivative(x);
    }
}

fn softmax_forward(args: &RowArgs<'_>, out: &mut [f32]) {
    softmax_row(args.input, out);
}

fn softmax_backward(args: &RowArgs<'_>, out: &mut [f32]) {
    softmax_row_backward(args.output, args.grad, out);
}

fn sigmoid_forward(args: &RowArgs<'_>, out: &mut [f32]) {
    for (o, &x) in out.iter_mut().zip(args.input) {
        *o = sigmoid(x);
    }
}

fn sigmoid_backward(args: &RowArgs<'_>, out: &mut [f32]) {
    for ((o, &y), &g) in out.iter_mut().zip(args.output).zip(args.grad) {
        *o = g * sigmoid_derivative(y);
    }
}

fn tanh_forward(args: &RowArgs<'_>, out: &mut [f32]) {
    for (o, &x) in out.iter_mut().zip(args.input) {
        *o = x.tanh();
    }
}

fn tanh_backward(args: &RowArgs<'_>, out: &mut [f32]) {
    for ((o, &y), &g) in out.iter_mut().zip(args.output).zip(args.grad) {
        *o = g * tanh_derivative(y);
    }
}

fn leaky_relu_forward(args: &RowArgs<'_>, out: &mut [f32]) {
    for (o, &x) in out.iter_mut().zip(args.input) {
        *o = leaky_relu(x);
    }
}

fn leaky_relu_backward(args: &RowArgs<'_>, out: &mut [f32]) {
    for ((o, &x), &g) in out.iter_mut().zip(args.input).zip(args.grad) {
        *o = g * leaky_relu_derivative(x);
    }
}

// Indexed by [ActivationKind][Direction].
const KERNELS: [[RowKernel; 2]; 5] = [
    [relu_forward, relu_backward],
    [softmax_forward, softmax_backward],
    [sigmoid_forward, sigmoid_backward],
    [tanh_forward, tanh_backward],
    [leaky_relu_forward, leaky_relu_backward],
];

/// Looks up the row kernel for one activation and direction.
pub fn kernel(kind: ActivationKind, direction: Direction) -> RowKernel {
    KERNELS[kind as usize][direction as usize]
}

fn row(data: &[f32], b: usize, width: usize) -> &[f32] {
    if data.is_empty() {
        data
    } else {
        &data[b * width..(b + 1) * width]
    }
}

/// Runs `kernel` over the first `batch` rows of `out`.
pub fn dispatch(
    kernel: RowKernel,
    input: &[f32],
    output: &[f32],
    grad: &[f32],
    out: &mut [f32],
    batch: usize,
    width: usize,
) {
    if width == 0 {
        return;
    }
    out[..batch * width]
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(b, out_row)| {
            let args = RowArgs {
                input: row(input, b, width),
                output: row(output, b, width),
                grad: row(grad, b, width),
            };
            kernel(&args, out_row);
        });
}

/// Activation layer; its width is inherited from the predecessor.
pub struct Activation {
    kind: ActivationKind,
    node_count: Option<usize>,
    output: TensorBuffer,
}

impl Activation {
    pub fn new(kind: ActivationKind) -> Self {
        Self {
            kind,
            node_count: None,
            output: TensorBuffer::new("activation.output", 0),
        }
    }

    pub fn activation(&self) -> ActivationKind {
        self.kind
    }

    fn width(&self) -> usize {
        self.node_count.unwrap_or(0)
    }
}

impl Layer for Activation {
    fn kind(&self) -> LayerKind {
        LayerKind::Activation
    }

    fn node_count(&self) -> Option<usize> {
        self.node_count
    }

    fn init(&mut self, ctx: InitContext<'_>) {
        self.node_count = Some(ctx.prev_node_count);
        self.output = TensorBuffer::new("activation.output", ctx.max_batch * ctx.prev_node_count);
    }

    fn forward(&mut self, feed: Feed<'_>) {
        let width = self.width();
        dispatch(
            kernel(self.kind, Direction::Forward),
            feed.input,
            &[],
            &[],
            self.output.as_mut_slice(),
            feed.batch,
            width,
        );
    }

    fn backward(&mut self, pass: BackwardPass<'_>) {
        let width = self.width();
        let swap = pass.swap;
        dispatch(
            kernel(self.kind, Direction::Backward),
            pass.feed.input,
            self.output.as_slice(),
            swap.d_output.as_slice(),
            swap.d_input.as_mut_slice(),
            pass.feed.batch,
            width,
        );
    }

    fn output(&self) -> &[f32] {
        self.output.as_slice()
    }

    fn release(&mut self) {
        self.output.release();
    }
}

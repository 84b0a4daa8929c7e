//! Layer trait definition for the layer chain
//!
//! This module defines the core Layer trait that all layer types implement,
//! together with the small context structs the network hands to each call.
//! Layers never see their neighbours: the network passes the predecessor's
//! output as `input` and drives the shared swap buffer.

use crate::config::NetConfig;
use crate::layers::{LayerSwapBuffer, Linear};
use crate::optimizers::UpdateStep;
use crate::utils::Rng;

/// Variant tag of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Linear,
    Activation,
    Dropout,
    Loss,
}

/// Everything a layer needs to size and initialise itself.
pub struct InitContext<'a> {
    pub config: &'a NetConfig,
    /// Width of the predecessor's output (dataset input width for the first layer).
    pub prev_node_count: usize,
    /// Largest batch the network will ever run.
    pub max_batch: usize,
    pub rng: &'a mut Rng,
}

/// Data visible to a layer during one forward or backward call.
#[derive(Clone, Copy)]
pub struct Feed<'a> {
    /// The predecessor's output, `batch × prev_node_count`.
    pub input: &'a [f32],
    /// Dataset targets; only the loss layer reads them.
    pub target: &'a [f32],
    pub batch: usize,
}

/// One backward step.
pub struct BackwardPass<'a> {
    pub feed: Feed<'a>,
    pub swap: &'a mut LayerSwapBuffer,
    pub step: &'a UpdateStep,
}

/// Core trait for chain layers.
///
/// # Example
///
/// ```ignore
/// layer.init(InitContext { config: &config, prev_node_count: 4, max_batch: 32, rng: &mut rng });
/// layer.forward(Feed { input: &x, target: &[], batch: 32 });
/// let y = layer.output();
/// ```
pub trait Layer: Send {
    fn kind(&self) -> LayerKind;

    /// Output width. `None` until `init` for layers that inherit it.
    fn node_count(&self) -> Option<usize>;

    /// Sizes buffers and, for linear layers, initialises parameters.
    fn init(&mut self, ctx: InitContext<'_>);

    /// Writes `output()` from `feed.input`.
    fn forward(&mut self, feed: Feed<'_>);

    /// Reads `swap.d_output`, writes `swap.d_input`.
    ///
    /// Linear layers also compute parameter gradients and, when clipping is
    /// off, apply the optimizer update immediately.
    fn backward(&mut self, pass: BackwardPass<'_>);

    /// Output of the last forward call (capacity-sized; the first
    /// `batch × node_count` values are valid).
    fn output(&self) -> &[f32];

    /// Frees every buffer. Calling it twice panics.
    fn release(&mut self);

    fn as_linear(&self) -> Option<&Linear> {
        None
    }

    fn as_linear_mut(&mut self) -> Option<&mut Linear> {
        None
    }
}

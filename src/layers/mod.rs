//! Layer abstractions for the layer chain
//!
//! This module provides the Layer trait, the shared gradient swap buffer and
//! the four layer variants: linear, activation, dropout and loss.

mod r#trait;
pub mod activation;
pub mod dropout;
pub mod linear;
pub mod loss;
pub mod swap_buffer;

// Re-export the Layer trait for convenience
pub use activation::{Activation, ActivationKind, Direction};
pub use dropout::Dropout;
pub use linear::Linear;
pub use loss::LossLayer;
pub use r#trait::{BackwardPass, Feed, InitContext, Layer, LayerKind};
pub use swap_buffer::LayerSwapBuffer;

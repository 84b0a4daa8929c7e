//! Error types for network construction, configuration and weight I/O.
//!
//! Capacity violations and use-after-release are programmer errors and panic
//! instead of surfacing here.

/// Errors returned by fallible constructors, config loaders and weight streams.
#[derive(thiserror::Error, Debug)]
pub enum NnError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A categorical distribution was requested without logits or probabilities.
    #[error("either `probs` or `logits` must be specified")]
    MissingDistributionInput,

    /// Two buffers or dimensions that must agree do not.
    #[error("{what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A persisted weight stream ended before every parameter was read.
    #[error("weight stream truncated: expected {expected} bytes, got {actual}")]
    WeightStream { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, NnError>;

//! Shared utilities for the network and the agent
//!
//! This module provides common utilities like random number generation,
//! activation math and learning-rate schedules.

pub mod activations;
pub mod lr_scheduler;
pub mod rng;

pub use activations::{argmax, softmax_row, softmax_rows};
pub use lr_scheduler::{ConstantLr, LinearAnnealing, LrScheduler};
pub use rng::Rng;

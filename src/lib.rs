//! Neural PPO Library
//!
//! A layer-chain neural network engine with hand-derived forward and backward
//! passes, and a Proximal Policy Optimization agent built on top of it.
//!
//! # Modules
//!
//! - `tensor`, `kernels`: fixed-capacity buffers and data-parallel batch kernels
//! - `layers`: Layer trait, linear/activation/dropout/loss layers, swap buffer
//! - `optimizers`: SGD, Momentum, Nesterov, AdaGrad, RMSprop, Adam
//! - `clip`: global-norm gradient clipping
//! - `network`: chain orchestration and weight persistence
//! - `distributions`: categorical action distribution with Jacobians
//! - `rl`: environments, GAE, PPO loss and the agent
//! - `data`: raw image-record transforms
//! - `config`, `architecture`: JSON configuration
//! - `utils`: RNG, activation math, learning-rate schedules

pub mod architecture;
pub mod clip;
pub mod config;
pub mod data;
pub mod dataset;
pub mod distributions;
pub mod error;
pub mod kernels;
pub mod layers;
pub mod network;
pub mod optimizers;
pub mod rl;
pub mod tensor;
pub mod utils;

pub use error::{NnError, Result};
pub use network::NeuralNet;

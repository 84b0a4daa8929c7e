//! Reinforcement learning on top of the layer-chain networks
//!
//! This module provides the environment interface, a cart-pole environment,
//! running normalisation, advantage estimation, the PPO loss and the agent
//! that ties them together.

pub mod agent;
pub mod cartpole;
pub mod env;
pub mod gae;
pub mod normalize;
pub mod ppo_loss;

pub use agent::{EpisodeStats, EpisodeSummary, PpoAgent, TrainSummary};
pub use cartpole::CartPole;
pub use env::{Environment, Step};
pub use gae::compute_gae;
pub use normalize::{Normalization, RewardScaling, RunningMeanStd};
pub use ppo_loss::{normalize_advantages, PpoLoss, PpoLossOutput, RolloutBatch};

//! Configuration structures for networks and the PPO agent
//!
//! Both structures deserialize from JSON with every field optional; missing
//! fields take the defaults of the reference CartPole setup. Loading always
//! validates, so a returned config is safe to build networks from.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{NnError, Result};

/// Whether a network trains or only runs inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetType {
    #[default]
    Train,
    Predict,
}

/// Weight initialisation scheme for linear layers. Biases always start at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitKind {
    /// Uniform in `[-s, s]` with `s = 1/sqrt(fan_in)`.
    Random,
    /// Normal with standard deviation `1/sqrt(fan_in)`.
    Xavier,
    /// Normal with standard deviation `sqrt(2/fan_in)`.
    #[default]
    He,
    /// Leave parameters untouched; weights come from a persisted stream.
    None,
}

/// Parameter update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Momentum,
    Nesterov,
    #[serde(rename = "adagrad")]
    AdaGrad,
    #[serde(rename = "rmsprop")]
    RmsProp,
    #[default]
    Adam,
}

/// Built-in loss appended after the last layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// The caller injects the output gradient before `backward`.
    #[default]
    None,
    Mse,
    CrossEntropy,
}

/// Network-level options.
///
/// # Example
///
/// ```json
/// {
///   "net_type": "train",
///   "init": "he",
///   "optimizer": "adam",
///   "loss": "cross_entropy",
///   "clip_grad": true,
///   "max_grad_norm": 0.5
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub net_type: NetType,
    pub init: InitKind,
    pub optimizer: OptimizerKind,
    pub loss: LossKind,
    /// Rescale all gradients jointly when their global L2 norm exceeds `max_grad_norm`.
    pub clip_grad: bool,
    pub max_grad_norm: f32,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            net_type: NetType::Train,
            init: InitKind::He,
            optimizer: OptimizerKind::Adam,
            loss: LossKind::None,
            clip_grad: false,
            max_grad_norm: 0.5,
        }
    }
}

impl NetConfig {
    pub fn is_train(&self) -> bool {
        self.net_type == NetType::Train
    }

    pub fn validate(&self) -> Result<()> {
        if self.clip_grad && !(self.max_grad_norm > 0.0) {
            return Err(NnError::Config(format!(
                "max_grad_norm must be positive when clip_grad is set, got {}",
                self.max_grad_norm
            )));
        }
        Ok(())
    }
}

/// PPO hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoConfig {
    pub seed: u64,
    /// Transitions collected per training iteration.
    pub num_steps: usize,
    pub minibatch_size: usize,
    pub update_epochs: usize,
    pub learning_rate: f32,
    /// Anneal the learning rate linearly to zero over `max_iterations`.
    pub learning_rate_decay: bool,
    pub max_iterations: usize,
    pub gamma: f32,
    pub gae_lambda: f32,
    pub norm_adv: bool,
    pub clip_vloss: bool,
    pub clip_coef: f32,
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub normalize_state: bool,
    pub scale_reward: bool,
    pub hidden_size: usize,
    /// Optimizer epsilon.
    pub min_delta: f32,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            num_steps: 128,
            minibatch_size: 32,
            update_epochs: 4,
            learning_rate: 2.5e-4,
            learning_rate_decay: false,
            max_iterations: 4000,
            gamma: 0.99,
            gae_lambda: 0.95,
            norm_adv: true,
            clip_vloss: true,
            clip_coef: 0.2,
            ent_coef: 0.01,
            vf_coef: 0.5,
            normalize_state: false,
            scale_reward: false,
            hidden_size: 64,
            min_delta: 1e-5,
        }
    }
}

impl PpoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.minibatch_size == 0 {
            return Err(NnError::Config("minibatch_size must be at least 1".into()));
        }
        if self.num_steps < self.minibatch_size || self.num_steps % self.minibatch_size != 0 {
            return Err(NnError::Config(format!(
                "minibatch_size {} must divide num_steps {}",
                self.minibatch_size, self.num_steps
            )));
        }
        if self.hidden_size == 0 {
            return Err(NnError::Config("hidden_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.gamma) || !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(NnError::Config(
                "gamma and gae_lambda must lie in [0, 1]".into(),
            ));
        }
        for (name, value) in [
            ("learning_rate", self.learning_rate),
            ("clip_coef", self.clip_coef),
            ("ent_coef", self.ent_coef),
            ("vf_coef", self.vf_coef),
            ("min_delta", self.min_delta),
        ] {
            if value < 0.0 {
                return Err(NnError::Config(format!("{name} must be non-negative")));
            }
        }
        Ok(())
    }

    /// Number of minibatches per update epoch.
    pub fn minibatch_count(&self) -> usize {
        self.num_steps / self.minibatch_size
    }
}

/// Loads a network configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use neural_ppo::config::load_config;
///
/// let cfg = load_config("config/cartpole_net.json").unwrap();
/// assert!(cfg.is_train());
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<NetConfig> {
    let contents = fs::read_to_string(path)?;
    let config: NetConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Loads PPO hyperparameters from a JSON file.
pub fn load_ppo_config(path: impl AsRef<Path>) -> Result<PpoConfig> {
    let contents = fs::read_to_string(path)?;
    let config: PpoConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let cfg: NetConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.optimizer, OptimizerKind::Adam);
        assert_eq!(cfg.loss, LossKind::None);
        assert!(!cfg.clip_grad);

        let ppo: PpoConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(ppo.num_steps, 128);
        assert_eq!(ppo.minibatch_count(), 4);
    }

    #[test]
    fn test_enum_names() {
        let cfg: NetConfig = serde_json::from_str(
            r#"{"optimizer": "rmsprop", "init": "none", "loss": "cross_entropy", "net_type": "predict"}"#,
        )
        .unwrap();
        assert_eq!(cfg.optimizer, OptimizerKind::RmsProp);
        assert_eq!(cfg.init, InitKind::None);
        assert_eq!(cfg.loss, LossKind::CrossEntropy);
        assert_eq!(cfg.net_type, NetType::Predict);
    }

    #[test]
    fn test_minibatch_must_divide_steps() {
        let ppo = PpoConfig {
            num_steps: 10,
            minibatch_size: 4,
            ..PpoConfig::default()
        };
        assert!(matches!(ppo.validate(), Err(NnError::Config(_))));
    }

    #[test]
    fn test_clip_requires_positive_norm() {
        let cfg = NetConfig {
            clip_grad: true,
            max_grad_norm: 0.0,
            ..NetConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}

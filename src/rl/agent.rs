//! PPO agent: rollout collection, GAE and the minibatch training loop.
//!
//! The agent alternates between two phases. While the rollout is not full
//! every call to [`collect_step`](PpoAgent::collect_step) runs the actor and
//! critic on the current observation, samples an action, steps the
//! environment and appends the transition. Once `num_steps` transitions are
//! cached, [`train`](PpoAgent::train) computes advantages and runs
//! `update_epochs` passes over shuffled minibatches, injecting the PPO loss
//! gradients directly into both networks.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::{debug, info, trace};

use crate::config::{LossKind, NetConfig, PpoConfig};
use crate::dataset::Dataset;
use crate::distributions::Categorical;
use crate::error::Result;
use crate::layers::{Activation, ActivationKind, Layer, Linear};
use crate::network::NeuralNet;
use crate::optimizers::Hyperparams;
use crate::rl::env::Environment;
use crate::rl::gae::compute_gae;
use crate::rl::normalize::{Normalization, RewardScaling, RunningMeanStd};
use crate::rl::ppo_loss::{PpoLoss, RolloutBatch};
use crate::utils::{ConstantLr, LinearAnnealing, LrScheduler, Rng};

/// Episode lengths seen during one training iteration.
#[derive(Debug, Clone)]
pub struct EpisodeStats {
    min: Option<usize>,
    max: Option<usize>,
    lengths: RunningMeanStd,
    current: usize,
}

/// Snapshot of [`EpisodeStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub min: usize,
    pub max: usize,
    pub mean: f32,
    pub episodes: usize,
}

impl EpisodeStats {
    fn new() -> Self {
        Self {
            min: None,
            max: None,
            lengths: RunningMeanStd::new(1),
            current: 0,
        }
    }

    fn record(&mut self, length: usize) {
        self.min = Some(self.min.map_or(length, |m| m.min(length)));
        self.max = Some(self.max.map_or(length, |m| m.max(length)));
        self.lengths.update_scalar(length as f32);
    }

    fn step(&mut self) {
        self.current += 1;
    }

    /// Closes the running episode and returns its length.
    fn finish(&mut self) -> usize {
        let length = self.current;
        self.record(length);
        self.current = 0;
        length
    }

    /// Counts the unfinished episode as if it ended now, without closing it.
    fn include_current(&mut self) {
        if self.current > 0 {
            self.record(self.current);
        }
    }

    fn reset(&mut self) {
        self.min = None;
        self.max = None;
        self.lengths.reset();
    }

    /// Steps taken in the unfinished episode.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn summary(&self) -> EpisodeSummary {
        EpisodeSummary {
            min: self.min.unwrap_or(0),
            max: self.max.unwrap_or(0),
            mean: self.lengths.mean()[0],
            episodes: self.lengths.count(),
        }
    }
}

/// Averages over every minibatch of one training iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    /// Zero-based index of the iteration that just finished.
    pub iteration: usize,
    pub learning_rate: f32,
    pub minibatches: usize,
    pub loss: f32,
    pub pg_loss: f32,
    pub v_loss: f32,
    pub entropy: f32,
    pub approx_kl: f32,
    pub clipfrac: f32,
    pub episodes: EpisodeSummary,
}

/// Builds `Linear(h) → Tanh → Linear(h) → Tanh → Linear(out)`.
pub fn mlp_layers(hidden: usize, outputs: usize) -> Vec<Box<dyn Layer>> {
    vec![
        Box::new(Linear::new(hidden)),
        Box::new(Activation::new(ActivationKind::Tanh)),
        Box::new(Linear::new(hidden)),
        Box::new(Activation::new(ActivationKind::Tanh)),
        Box::new(Linear::new(outputs)),
    ]
}

fn forward_net(net: &mut NeuralNet, obs: &[f32], batch: usize) -> Vec<f32> {
    let dataset = net.dataset_mut();
    dataset.set_batch_size(batch);
    let len = batch * dataset.input_count();
    dataset.input_mut()[..len].copy_from_slice(&obs[..len]);
    net.forward();
    net.output().to_vec()
}

fn backward_net(net: &mut NeuralNet, grad: &[f32], batch: usize) {
    net.dataset_mut().set_batch_size(batch);
    net.output_gradient_mut().copy_from_slice(grad);
    net.backward();
}

/// Actor-critic PPO learner for a discrete-action environment.
pub struct PpoAgent<E: Environment> {
    config: PpoConfig,
    env: E,
    actor: NeuralNet,
    critic: NeuralNet,
    loss: PpoLoss,
    rng: Rng,
    scheduler: Box<dyn LrScheduler>,
    obs_norm: Normalization,
    reward_scaling: RewardScaling,
    obs_len: usize,
    action_count: usize,

    obs: Vec<f32>,
    actions: Vec<usize>,
    log_probs: Vec<f32>,
    values: Vec<f32>,
    rewards: Vec<f32>,
    dones: Vec<f32>,
    advantages: Vec<f32>,
    returns: Vec<f32>,
    cache_count: usize,

    next_obs: Vec<f32>,
    next_done: f32,

    steps: usize,
    train_count: usize,
    iteration: usize,
    episodes: EpisodeStats,
}

impl<E: Environment> PpoAgent<E> {
    /// Builds actor and critic from `net_config` and resets the environment.
    ///
    /// Both networks always run without a built-in loss; the PPO loss
    /// gradients are injected directly. In predict mode (or with
    /// `init = none`) the weights must be loaded before acting.
    pub fn new(config: PpoConfig, net_config: NetConfig, mut env: E) -> Result<Self> {
        config.validate()?;
        let net_config = NetConfig {
            loss: LossKind::None,
            ..net_config
        };
        let obs_len = env.observation_len();
        let action_count = env.action_count();
        let capacity = config.minibatch_size;
        let mut rng = Rng::new(config.seed);

        let mut actor = NeuralNet::new(
            net_config.clone(),
            mlp_layers(config.hidden_size, action_count),
            Dataset::new(capacity, obs_len, action_count),
        )?;
        actor.init(&mut rng);
        let mut critic = NeuralNet::new(
            net_config,
            mlp_layers(config.hidden_size, 1),
            Dataset::new(capacity, obs_len, 1),
        )?;
        critic.init(&mut rng);

        let scheduler: Box<dyn LrScheduler> = if config.learning_rate_decay {
            Box::new(LinearAnnealing::new(config.learning_rate, config.max_iterations))
        } else {
            Box::new(ConstantLr::new(config.learning_rate))
        };

        let mut obs_norm = Normalization::new(obs_len);
        let mut next_obs = env.reset();
        if config.normalize_state {
            obs_norm.apply(&mut next_obs);
        }

        let rollout_len = config.num_steps;
        Ok(Self {
            loss: PpoLoss::from(&config),
            reward_scaling: RewardScaling::new(config.gamma),
            config,
            env,
            actor,
            critic,
            rng,
            scheduler,
            obs_norm,
            obs_len,
            action_count,
            obs: vec![0.0; rollout_len * obs_len],
            actions: vec![0; rollout_len],
            log_probs: vec![0.0; rollout_len],
            values: vec![0.0; rollout_len],
            rewards: vec![0.0; rollout_len],
            dones: vec![0.0; rollout_len],
            advantages: vec![0.0; rollout_len],
            returns: vec![0.0; rollout_len],
            cache_count: 0,
            next_obs,
            next_done: 0.0,
            steps: 0,
            train_count: 0,
            iteration: 0,
            episodes: EpisodeStats::new(),
        })
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn actor(&self) -> &NeuralNet {
        &self.actor
    }

    pub fn critic(&self) -> &NeuralNet {
        &self.critic
    }

    pub fn observation_len(&self) -> usize {
        self.obs_len
    }

    pub fn action_count(&self) -> usize {
        self.action_count
    }

    /// Completed training iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Minibatch updates applied so far.
    pub fn train_count(&self) -> usize {
        self.train_count
    }

    /// Environment steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Transitions currently cached in the rollout.
    pub fn cache_count(&self) -> usize {
        self.cache_count
    }

    /// Observations cached in the rollout, one row per transition.
    pub fn rollout_observations(&self) -> &[f32] {
        &self.obs[..self.cache_count * self.obs_len]
    }

    /// Cached done flags; `1` marks a row whose observation starts an episode.
    pub fn rollout_dones(&self) -> &[f32] {
        &self.dones[..self.cache_count]
    }

    pub fn rollout_rewards(&self) -> &[f32] {
        &self.rewards[..self.cache_count]
    }

    pub fn episode_stats(&self) -> &EpisodeStats {
        &self.episodes
    }

    /// Learning rate the next training iteration will use.
    pub fn learning_rate(&mut self) -> f32 {
        self.scheduler.set_iteration(self.iteration);
        self.scheduler.get_lr()
    }

    /// Collects one transition, then trains if the rollout is full.
    pub fn update(&mut self) -> Option<TrainSummary> {
        self.collect_step();
        self.train()
    }

    /// Collects `num_steps` transitions, then trains.
    pub fn update_fast(&mut self) -> Option<TrainSummary> {
        for _ in 0..self.config.num_steps {
            self.collect_step();
        }
        self.train()
    }

    /// Picks an action for `obs` without touching the rollout.
    ///
    /// `obs` is fed as given; normalise it first if the agent was trained with
    /// `normalize_state`.
    pub fn act(&mut self, obs: &[f32], greedy: bool) -> usize {
        let logits = forward_net(&mut self.actor, obs, 1);
        let dist = Categorical::from_logits(&logits, 1, false);
        if greedy {
            dist.mode()[0]
        } else {
            dist.sample(&mut self.rng)[0]
        }
    }

    /// Appends one environment transition to the rollout.
    ///
    /// Does nothing while the rollout is full. When an episode ends the
    /// environment is reset immediately and the stored done flag marks the
    /// boundary for the next transition.
    pub fn collect_step(&mut self) {
        if self.cache_count >= self.config.num_steps {
            return;
        }
        let index = self.cache_count;
        let obs = std::mem::take(&mut self.next_obs);
        self.obs[index * self.obs_len..(index + 1) * self.obs_len].copy_from_slice(&obs);
        self.dones[index] = self.next_done;

        let logits = forward_net(&mut self.actor, &obs, 1);
        let value = forward_net(&mut self.critic, &obs, 1)[0];
        let dist = Categorical::from_logits(&logits, 1, false);
        let action = dist.sample(&mut self.rng)[0];
        let log_prob = dist.log_prob(&[action], None)[0];
        trace!(
            "obs {:?} logits {:?} probs {:?} action {}",
            obs,
            logits,
            dist.probs(),
            action
        );

        let mut step = self.env.step(action);
        self.steps += 1;
        if self.config.normalize_state {
            self.obs_norm.apply(&mut step.observation);
        }
        if self.config.scale_reward {
            step.reward = self.reward_scaling.apply(step.reward);
        }
        let done = step.is_done();

        self.actions[index] = action;
        self.log_probs[index] = log_prob;
        self.values[index] = value;
        self.rewards[index] = step.reward;

        self.episodes.step();
        if done {
            let length = self.episodes.finish();
            if !self.actor.is_train() {
                info!("episode finished after {length} steps");
            }
            self.reward_scaling.reset();
            let mut obs = self.env.reset();
            if self.config.normalize_state {
                self.obs_norm.apply(&mut obs);
            }
            self.next_obs = obs;
        } else {
            self.next_obs = step.observation;
        }
        self.next_done = if done { 1.0 } else { 0.0 };
        self.cache_count += 1;
    }

    /// Runs one PPO iteration once the rollout is full.
    ///
    /// Returns `None` when nothing was trained: the rollout is not yet full,
    /// or the networks are in predict mode (which just discards the cache).
    pub fn train(&mut self) -> Option<TrainSummary> {
        if !self.actor.is_train() {
            self.cache_count = 0;
            return None;
        }
        let num_steps = self.config.num_steps;
        if self.cache_count < num_steps {
            return None;
        }

        self.episodes.include_current();
        let learning_rate = self.learning_rate();

        let next_obs = self.next_obs.clone();
        let next_value = forward_net(&mut self.critic, &next_obs, 1)[0];
        let (advantages, returns) = compute_gae(
            &self.rewards,
            &self.values,
            &self.dones,
            next_value,
            self.next_done,
            self.config.gamma,
            self.config.gae_lambda,
        );
        self.advantages = advantages;
        self.returns = returns;

        let hyper = Hyperparams::default()
            .with_learning_rate(learning_rate)
            .with_epsilon(self.config.min_delta)
            .with_epoch((self.iteration + 1) as u32);
        self.actor.set_hyperparams(hyper);
        self.critic.set_hyperparams(hyper);

        let mb = self.config.minibatch_size;
        let obs_len = self.obs_len;
        let mut totals = [0.0f32; 6];
        let mut minibatches = 0usize;
        let mut mb_obs = vec![0.0; mb * obs_len];

        for epoch in 0..self.config.update_epochs {
            let order = self.rng.permutation(num_steps);
            for start in (0..num_steps).step_by(mb) {
                let indices = &order[start..start + mb];
                for (b, &src) in indices.iter().enumerate() {
                    mb_obs[b * obs_len..(b + 1) * obs_len]
                        .copy_from_slice(&self.obs[src * obs_len..(src + 1) * obs_len]);
                }

                let logits = forward_net(&mut self.actor, &mb_obs, mb);
                let new_values = forward_net(&mut self.critic, &mb_obs, mb);
                let rollout = RolloutBatch {
                    log_probs: &self.log_probs,
                    actions: &self.actions,
                    values: &self.values,
                    advantages: &self.advantages,
                    returns: &self.returns,
                    indices,
                };
                let out = self.loss.compute(&rollout, &logits, &new_values);
                debug!(
                    "iteration {} train {} epoch {} start {} loss {:.6}",
                    self.iteration,
                    self.train_count,
                    epoch + 1,
                    start,
                    out.loss
                );

                backward_net(&mut self.actor, &out.d_actor, mb);
                backward_net(&mut self.critic, &out.d_critic, mb);
                self.train_count += 1;
                minibatches += 1;

                for (total, value) in totals.iter_mut().zip([
                    out.loss,
                    out.pg_loss,
                    out.v_loss,
                    out.entropy,
                    out.approx_kl,
                    out.clipfrac,
                ]) {
                    *total += value;
                }
            }
        }

        self.cache_count -= num_steps;
        let scale = 1.0 / minibatches.max(1) as f32;
        let summary = TrainSummary {
            iteration: self.iteration,
            learning_rate,
            minibatches,
            loss: totals[0] * scale,
            pg_loss: totals[1] * scale,
            v_loss: totals[2] * scale,
            entropy: totals[3] * scale,
            approx_kl: totals[4] * scale,
            clipfrac: totals[5] * scale,
            episodes: self.episodes.summary(),
        };
        self.iteration += 1;

        info!(
            "iteration {}: episode length min {} max {} mean {:.1}, lr {:.2e}, loss {:.4}, \
             pg {:.4}, v {:.4}, entropy {:.4}",
            summary.iteration,
            summary.episodes.min,
            summary.episodes.max,
            summary.episodes.mean,
            learning_rate,
            summary.loss,
            summary.pg_loss,
            summary.v_loss,
            summary.entropy
        );
        self.episodes.reset();
        Some(summary)
    }

    /// Writes actor then critic parameters to two streams.
    pub fn save_weights<A: Write, C: Write>(&self, actor: A, critic: C) -> Result<()> {
        self.actor.save_weights(actor)?;
        self.critic.save_weights(critic)
    }

    pub fn load_weights<A: Read, C: Read>(&mut self, actor: A, critic: C) -> Result<()> {
        self.actor.load_weights(actor)?;
        self.critic.load_weights(critic)
    }

    pub fn save_weights_to_files(
        &self,
        actor: impl AsRef<Path>,
        critic: impl AsRef<Path>,
    ) -> Result<()> {
        self.save_weights(
            BufWriter::new(File::create(actor)?),
            BufWriter::new(File::create(critic)?),
        )
    }

    pub fn load_weights_from_files(
        &mut self,
        actor: impl AsRef<Path>,
        critic: impl AsRef<Path>,
    ) -> Result<()> {
        self.load_weights(
            BufReader::new(File::open(actor)?),
            BufReader::new(File::open(critic)?),
        )
    }

    /// Frees both networks.
    pub fn release(&mut self) {
        self.actor.release();
        self.critic.release();
    }
}

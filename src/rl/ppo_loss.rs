//! Clipped-surrogate PPO loss with a hand-derived backward pass.
//!
//! For a minibatch of size `B` with normalised advantages `A`:
//!
//! ```text
//! ratio   = exp(newlogp − oldlogp)
//! pg      = mean(max(−A·ratio, −A·clip(ratio, 1−ε, 1+ε)))
//! v       = 0.5 · mean(max((V−R)², (clip(V−V_old, −ε, ε) + V_old − R)²))   (clip_vloss)
//!         = 0.5 · mean((V−R)²)                                              (otherwise)
//! loss    = pg − ent_coef · mean(H) + vf_coef · v
//! ```
//!
//! The gradients with respect to the actor logits and critic values are
//! returned so they can be written straight into each network's output
//! gradient slot.

use crate::config::PpoConfig;
use crate::distributions::Categorical;

const ADV_EPSILON: f32 = 1e-8;

/// Cached rollout arrays read through a shuffled index window.
///
/// Element `i` of the minibatch is `array[indices[i]]`.
#[derive(Debug, Clone, Copy)]
pub struct RolloutBatch<'a> {
    pub log_probs: &'a [f32],
    pub actions: &'a [usize],
    pub values: &'a [f32],
    pub advantages: &'a [f32],
    pub returns: &'a [f32],
    pub indices: &'a [usize],
}

impl RolloutBatch<'_> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    fn gather<T: Copy>(&self, array: &[T], i: usize) -> T {
        array[self.indices[i]]
    }
}

#[derive(Debug, Clone, Default)]
pub struct PpoLossOutput {
    pub loss: f32,
    pub pg_loss: f32,
    pub v_loss: f32,
    /// Mean entropy of the new policy.
    pub entropy: f32,
    pub approx_kl: f32,
    /// Fraction of samples whose ratio left `[1−ε, 1+ε]`.
    pub clipfrac: f32,
    /// `∂loss/∂logits`, shape `batch × action_count`.
    pub d_actor: Vec<f32>,
    /// `∂loss/∂value`, shape `batch`.
    pub d_critic: Vec<f32>,
}

/// Loss coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PpoLoss {
    pub clip_coef: f32,
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub norm_adv: bool,
    pub clip_vloss: bool,
}

impl From<&PpoConfig> for PpoLoss {
    fn from(config: &PpoConfig) -> Self {
        Self {
            clip_coef: config.clip_coef,
            ent_coef: config.ent_coef,
            vf_coef: config.vf_coef,
            norm_adv: config.norm_adv,
            clip_vloss: config.clip_vloss,
        }
    }
}

impl PpoLoss {
    /// Evaluates the loss on fresh `logits` / `new_values` and backpropagates
    /// it to both.
    pub fn compute(&self, rollout: &RolloutBatch<'_>, logits: &[f32], new_values: &[f32]) -> PpoLossOutput {
        let batch = rollout.len();
        if batch == 0 {
            return PpoLossOutput::default();
        }
        let inv_batch = 1.0 / batch as f32;
        let dist = Categorical::from_logits(logits, batch, true);
        let count = dist.count();

        let actions: Vec<usize> = (0..batch).map(|i| rollout.gather(rollout.actions, i)).collect();
        let mut d_logprob_d_logits = vec![0.0; batch * count];
        let mut d_entropy_d_logits = vec![0.0; batch * count];
        let new_log_probs = dist.log_prob(&actions, Some(&mut d_logprob_d_logits));
        let entropy = dist.entropy(Some(&mut d_entropy_d_logits));

        let mut ratio = vec![0.0; batch];
        let mut approx_kl = 0.0;
        let mut clipped = 0usize;
        for i in 0..batch {
            let log_ratio = new_log_probs[i] - rollout.gather(rollout.log_probs, i);
            ratio[i] = log_ratio.exp();
            approx_kl += (ratio[i] - 1.0) - log_ratio;
            if (ratio[i] - 1.0).abs() > self.clip_coef {
                clipped += 1;
            }
        }

        let mut advantages: Vec<f32> = (0..batch)
            .map(|i| rollout.gather(rollout.advantages, i))
            .collect();
        if self.norm_adv {
            normalize_advantages(&mut advantages);
        }

        // Policy loss.
        let (low, high) = (1.0 - self.clip_coef, 1.0 + self.clip_coef);
        let mut pg_sum = 0.0;
        let mut d_ratio = vec![0.0; batch];
        for i in 0..batch {
            let adv = advantages[i];
            let pg1 = -adv * ratio[i];
            let pg2 = -adv * ratio[i].clamp(low, high);
            pg_sum += pg1.max(pg2);

            let in_range = (low..=high).contains(&ratio[i]);
            let d_pg1 = -adv;
            let d_pg2 = if in_range { -adv } else { 0.0 };
            d_ratio[i] = if pg1 > pg2 { d_pg1 } else { d_pg2 } * inv_batch;
        }
        let pg_loss = pg_sum * inv_batch;

        // Value loss.
        let mut v_sum = 0.0;
        let mut d_critic = vec![0.0; batch];
        for i in 0..batch {
            let ret = rollout.gather(rollout.returns, i);
            let nv = new_values[i];
            let unclipped = (nv - ret) * (nv - ret);
            if self.clip_vloss {
                let old = rollout.gather(rollout.values, i);
                let diff = nv - old;
                let v_clipped = old + diff.clamp(-self.clip_coef, self.clip_coef);
                let clipped_loss = (v_clipped - ret) * (v_clipped - ret);
                v_sum += unclipped.max(clipped_loss);

                let d_unclipped = 2.0 * (nv - ret);
                let d_clip = if (-self.clip_coef..=self.clip_coef).contains(&diff) {
                    1.0
                } else {
                    0.0
                };
                let d_clipped = d_clip * 2.0 * (v_clipped - ret);
                let d_max = if unclipped > clipped_loss { d_unclipped } else { d_clipped };
                d_critic[i] = 0.5 * d_max * inv_batch * self.vf_coef;
            } else {
                v_sum += unclipped;
                d_critic[i] = (nv - ret) * inv_batch * self.vf_coef;
            }
        }
        let v_loss = 0.5 * v_sum * inv_batch;

        let entropy_mean = entropy.iter().sum::<f32>() * inv_batch;
        let d_entropy = -self.ent_coef * inv_batch;
        let loss = pg_loss - self.ent_coef * entropy_mean + self.vf_coef * v_loss;

        let mut d_actor = vec![0.0; batch * count];
        for b in 0..batch {
            let d_logprob = d_ratio[b] * ratio[b];
            for j in 0..count {
                let k = b * count + j;
                d_actor[k] = d_logprob * d_logprob_d_logits[k] + d_entropy * d_entropy_d_logits[k];
            }
        }

        PpoLossOutput {
            loss,
            pg_loss,
            v_loss,
            entropy: entropy_mean,
            approx_kl: approx_kl * inv_batch,
            clipfrac: clipped as f32 * inv_batch,
            d_actor,
            d_critic,
        }
    }
}

/// Standardises advantages with the sample standard deviation (`n − 1`).
///
/// Left untouched for fewer than two samples, where the sample deviation is
/// undefined.
pub fn normalize_advantages(advantages: &mut [f32]) {
    let n = advantages.len();
    if n < 2 {
        return;
    }
    let mean = advantages.iter().sum::<f32>() / n as f32;
    let var = advantages.iter().map(|a| (a - mean) * (a - mean)).sum::<f32>() / (n - 1) as f32;
    let std = var.sqrt();
    for a in advantages.iter_mut() {
        *a = (*a - mean) / (std + ADV_EPSILON);
    }
}

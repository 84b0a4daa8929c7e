//! PPO tests
//!
//! Exercises the reinforcement-learning side of the library:
//! - Categorical sampling frequencies and error handling
//! - GAE against a hand-expanded reference
//! - The clipped surrogate when no ratio is clipped
//! - CartPole termination and truncation
//! - End-to-end agent iterations, predict mode and weight transfer

use std::io::Cursor;

use approx::{assert_abs_diff_eq, assert_relative_eq};

use neural_ppo::config::{InitKind, NetConfig, NetType, PpoConfig};
use neural_ppo::distributions::Categorical;
use neural_ppo::rl::{
    compute_gae, CartPole, Environment, PpoAgent, PpoLoss, RolloutBatch, Step,
};
use neural_ppo::utils::Rng;
use neural_ppo::NnError;

fn small_config() -> PpoConfig {
    PpoConfig {
        num_steps: 8,
        minibatch_size: 4,
        update_epochs: 3,
        hidden_size: 8,
        ..PpoConfig::default()
    }
}

// ============================================================================
// Categorical Distribution
// ============================================================================

mod categorical_tests {
    use super::*;

    #[test]
    fn test_sampling_frequencies_follow_probabilities() {
        let probs = [0.2, 0.3, 0.5];
        let dist = Categorical::from_probs(&probs, 1, false);
        let mut rng = Rng::new(42);
        let draws = 100_000;
        let mut counts = [0usize; 3];
        for _ in 0..draws {
            counts[dist.sample(&mut rng)[0]] += 1;
        }
        for (count, p) in counts.iter().zip(probs) {
            assert_abs_diff_eq!(*count as f32 / draws as f32, p, epsilon = 0.01);
        }
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let result = Categorical::new(None, None, 1, false);
        assert!(matches!(result, Err(NnError::MissingDistributionInput)));
    }

    #[test]
    fn test_logits_take_precedence() {
        let dist = Categorical::new(Some(&[0.0, 0.0]), Some(&[0.9, 0.1]), 1, false).unwrap();
        assert_relative_eq!(dist.probs()[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_uniform_entropy() {
        let dist = Categorical::from_logits(&[1.0; 4], 1, false);
        assert_relative_eq!(dist.entropy(None)[0], 4.0f32.ln(), epsilon = 1e-5);
    }
}

// ============================================================================
// Advantage Estimation
// ============================================================================

mod gae_tests {
    use super::*;

    #[test]
    fn test_three_step_reference() {
        let rewards = [1.0, 0.5, 2.0];
        let values = [0.3, 0.6, 0.9];
        let (gamma, lambda, next_value) = (0.99f32, 0.95f32, 1.2f32);
        let (advantages, returns) =
            compute_gae(&rewards, &values, &[0.0; 3], next_value, 0.0, gamma, lambda);

        let d0 = rewards[0] + gamma * values[1] - values[0];
        let d1 = rewards[1] + gamma * values[2] - values[1];
        let d2 = rewards[2] + gamma * next_value - values[2];
        let decay = gamma * lambda;
        let expected = [
            d0 + decay * d1 + decay * decay * d2,
            d1 + decay * d2,
            d2,
        ];
        for t in 0..3 {
            assert_abs_diff_eq!(advantages[t], expected[t], epsilon = 1e-6);
            assert_abs_diff_eq!(returns[t], expected[t] + values[t], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_done_after_last_step_drops_bootstrap() {
        let (advantages, _) = compute_gae(&[1.0], &[0.4], &[0.0], 100.0, 1.0, 0.99, 0.95);
        assert_abs_diff_eq!(advantages[0], 0.6, epsilon = 1e-6);
    }
}

// ============================================================================
// Surrogate Loss
// ============================================================================

mod surrogate_tests {
    use super::*;

    #[test]
    fn test_unclipped_ratios_give_plain_surrogate() {
        let logits = [0.1, 0.4, -0.2, 0.3, 0.0, 0.5];
        let actions = [1, 0, 1];
        let new_log_probs = Categorical::from_logits(&logits, 3, false).log_prob(&actions, None);
        let offsets = [0.05, -0.1, 0.12];
        let old_log_probs: Vec<f32> = new_log_probs
            .iter()
            .zip(offsets)
            .map(|(lp, offset)| lp - offset)
            .collect();
        let advantages = [0.7, -1.3, 0.4];
        let zeros = [0.0; 3];
        let indices = [0, 1, 2];
        let rollout = RolloutBatch {
            log_probs: &old_log_probs,
            actions: &actions,
            values: &zeros,
            advantages: &advantages,
            returns: &zeros,
            indices: &indices,
        };
        let loss = PpoLoss {
            clip_coef: 0.2,
            ent_coef: 0.0,
            vf_coef: 0.5,
            norm_adv: false,
            clip_vloss: false,
        };
        let out = loss.compute(&rollout, &logits, &zeros);

        let expected = (0..3)
            .map(|i| -advantages[i] * (new_log_probs[i] - old_log_probs[i]).exp())
            .sum::<f32>()
            / 3.0;
        assert_relative_eq!(out.pg_loss, expected, epsilon = 1e-6);
        assert_eq!(out.clipfrac, 0.0);
        assert_eq!(out.v_loss, 0.0);
        assert!(out.approx_kl >= 0.0);
    }

    #[test]
    fn test_shuffled_indices_gather_rows() {
        let logits = [0.0; 4];
        let old = [-(2.0f32.ln()); 2];
        let actions = [0, 1];
        let advantages = [1.0, 3.0];
        let values = [0.0, 0.0];
        let returns = [1.0, 2.0];
        let indices = [1];
        let rollout = RolloutBatch {
            log_probs: &old,
            actions: &actions,
            values: &values,
            advantages: &advantages,
            returns: &returns,
            indices: &indices,
        };
        let loss = PpoLoss {
            clip_coef: 0.2,
            ent_coef: 0.0,
            vf_coef: 1.0,
            norm_adv: true,
            clip_vloss: false,
        };
        let out = loss.compute(&rollout, &logits[..2], &[0.0]);

        // A single sample is not normalised; row 1 supplies A = 3 and R = 2.
        assert_relative_eq!(out.pg_loss, -3.0, epsilon = 1e-5);
        assert_relative_eq!(out.v_loss, 2.0, epsilon = 1e-6);
        assert_relative_eq!(out.d_critic[0], -2.0, epsilon = 1e-6);
    }
}

// ============================================================================
// CartPole
// ============================================================================

mod cartpole_tests {
    use super::*;

    #[test]
    fn test_reset_observation_is_small() {
        let mut env = CartPole::new(3);
        let obs = env.reset();
        assert_eq!(obs.len(), env.observation_len());
        assert!(obs.iter().all(|v| v.abs() <= 0.05));
    }

    #[test]
    fn test_constant_push_terminates() {
        let mut env = CartPole::new(5);
        env.reset();
        let mut steps = 0;
        loop {
            let step = env.step(1);
            steps += 1;
            if step.is_done() {
                assert!(step.terminated);
                assert!(!step.truncated);
                break;
            }
            assert!(steps < 500, "pushing one way never tipped the pole");
        }
    }

    #[test]
    fn test_truncation_at_step_limit() {
        let mut env = CartPole::new(5).with_max_episode_steps(4);
        env.reset();
        let mut last = None;
        for t in 0..4 {
            let step = env.step(t % 2);
            assert_eq!(step.reward, 1.0);
            last = Some(step);
        }
        let last = last.unwrap();
        assert!(last.truncated);
        assert!(!last.terminated);
    }
}

// ============================================================================
// Agent
// ============================================================================

mod agent_tests {
    use super::*;

    fn parameters(agent: &PpoAgent<CartPole>) -> Vec<f32> {
        agent
            .actor()
            .linear_layers()
            .flat_map(|linear| linear.weights().iter().chain(linear.bias()).copied())
            .collect()
    }

    #[test]
    fn test_one_iteration_runs_every_minibatch() {
        let config = small_config();
        let mut agent = PpoAgent::new(config, NetConfig::default(), CartPole::new(1)).unwrap();
        let before = parameters(&agent);

        let summary = agent.update_fast().unwrap();
        assert_eq!(summary.minibatches, 6);
        assert_eq!(agent.train_count(), 6);
        assert_eq!(agent.iteration(), 1);
        assert_eq!(agent.steps(), 8);
        assert_eq!(agent.cache_count(), 0);
        assert!(summary.loss.is_finite());
        assert_ne!(parameters(&agent), before);
    }

    #[test]
    fn test_update_trains_only_when_rollout_is_full() {
        let mut agent =
            PpoAgent::new(small_config(), NetConfig::default(), CartPole::new(2)).unwrap();
        for _ in 0..7 {
            assert!(agent.update().is_none());
        }
        assert_eq!(agent.cache_count(), 7);
        assert!(agent.update().is_some());
        assert_eq!(agent.iteration(), 1);
    }

    #[test]
    fn test_learning_rate_anneals() {
        let config = PpoConfig {
            learning_rate_decay: true,
            max_iterations: 4,
            ..small_config()
        };
        let mut agent = PpoAgent::new(config, NetConfig::default(), CartPole::new(3)).unwrap();
        let first = agent.update_fast().unwrap().learning_rate;
        let second = agent.update_fast().unwrap().learning_rate;
        assert!(second < first);
        assert!(second > 0.0);
    }

    #[test]
    fn test_predict_mode_never_trains() {
        let net = NetConfig {
            net_type: NetType::Predict,
            init: InitKind::None,
            ..NetConfig::default()
        };
        let mut agent = PpoAgent::new(small_config(), net, CartPole::new(4)).unwrap();
        for _ in 0..20 {
            assert!(agent.update().is_none());
        }
        assert_eq!(agent.steps(), 20);
        assert_eq!(agent.train_count(), 0);
        assert_eq!(agent.cache_count(), 0);
    }

    #[test]
    fn test_weights_transfer_to_predictor() {
        let mut trained =
            PpoAgent::new(small_config(), NetConfig::default(), CartPole::new(6)).unwrap();
        trained.update_fast();

        let (mut actor, mut critic) = (Vec::new(), Vec::new());
        trained.save_weights(&mut actor, &mut critic).unwrap();

        let net = NetConfig {
            net_type: NetType::Predict,
            init: InitKind::None,
            ..NetConfig::default()
        };
        let mut replay = PpoAgent::new(small_config(), net, CartPole::new(6)).unwrap();
        replay
            .load_weights(Cursor::new(actor), Cursor::new(critic))
            .unwrap();

        for obs in [[0.01, -0.02, 0.03, 0.0], [0.1, 0.5, -0.05, -0.4]] {
            assert_eq!(replay.act(&obs, true), trained.act(&obs, true));
        }
    }

    /// Episodes of three steps; observations are `[episode, step]`.
    struct ThreeStepEnv {
        episode: usize,
        step: usize,
    }

    impl Environment for ThreeStepEnv {
        fn observation_len(&self) -> usize {
            2
        }

        fn action_count(&self) -> usize {
            2
        }

        fn reset(&mut self) -> Vec<f32> {
            self.episode += 1;
            self.step = 0;
            vec![self.episode as f32, 0.0]
        }

        fn step(&mut self, _action: usize) -> Step {
            self.step += 1;
            Step {
                observation: vec![self.episode as f32, self.step as f32],
                reward: 1.0,
                terminated: self.step == 3,
                truncated: false,
            }
        }
    }

    #[test]
    fn test_episode_boundary_stores_reset_observation() {
        let config = PpoConfig {
            normalize_state: false,
            scale_reward: false,
            ..small_config()
        };
        let env = ThreeStepEnv {
            episode: 0,
            step: 0,
        };
        let mut agent = PpoAgent::new(config, NetConfig::default(), env).unwrap();
        for _ in 0..7 {
            agent.collect_step();
        }

        // The terminal observation is never stored; the reset one follows.
        let rows: Vec<_> = agent.rollout_observations().chunks(2).collect();
        assert_eq!(
            rows,
            [
                [1.0, 0.0],
                [1.0, 1.0],
                [1.0, 2.0],
                [2.0, 0.0],
                [2.0, 1.0],
                [2.0, 2.0],
                [3.0, 0.0],
            ]
        );
        assert_eq!(agent.rollout_dones(), &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        // No zero-reward filler transition at the boundary.
        assert!(agent.rollout_rewards().iter().all(|&r| r == 1.0));
        assert_eq!(agent.episode_stats().current(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PpoConfig {
            num_steps: 10,
            minibatch_size: 4,
            ..PpoConfig::default()
        };
        assert!(PpoAgent::new(config, NetConfig::default(), CartPole::new(1)).is_err());
    }
}

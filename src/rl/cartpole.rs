//! Classic cart-pole balancing task.
//!
//! Dynamics follow the Gymnasium `CartPole-v1` environment: a pole hinged on
//! a cart, pushed left or right with a fixed force and integrated with an
//! explicit Euler step.

use log::warn;

use crate::rl::env::{Environment, Step};
use crate::utils::Rng;

const GRAVITY: f32 = 9.8;
const MASS_CART: f32 = 1.0;
const MASS_POLE: f32 = 0.1;
const TOTAL_MASS: f32 = MASS_CART + MASS_POLE;
/// Half the pole length.
const LENGTH: f32 = 0.5;
const POLE_MASS_LENGTH: f32 = MASS_POLE * LENGTH;
const FORCE_MAG: f32 = 10.0;
const TAU: f32 = 0.02;

pub const X_THRESHOLD: f32 = 2.4;
pub const THETA_THRESHOLD_RADIANS: f32 = 12.0 * 2.0 * std::f32::consts::PI / 360.0;
pub const DEFAULT_MAX_EPISODE_STEPS: usize = 500;

/// State layout: `[x, x_dot, theta, theta_dot]`.
#[derive(Debug, Clone)]
pub struct CartPole {
    state: [f32; 4],
    sutton_barto_reward: bool,
    max_episode_steps: usize,
    episode_steps: usize,
    /// `None` until the episode terminates, then the number of extra steps.
    steps_beyond_terminated: Option<usize>,
    rng: Rng,
}

impl CartPole {
    pub fn new(seed: u64) -> Self {
        Self {
            state: [0.0; 4],
            sutton_barto_reward: false,
            max_episode_steps: DEFAULT_MAX_EPISODE_STEPS,
            episode_steps: 0,
            steps_beyond_terminated: None,
            rng: Rng::new(seed),
        }
    }

    /// Rewards 0 per surviving step and −1 on failure instead of 1 per step.
    pub fn with_sutton_barto_reward(mut self, enabled: bool) -> Self {
        self.sutton_barto_reward = enabled;
        self
    }

    pub fn with_max_episode_steps(mut self, steps: usize) -> Self {
        self.max_episode_steps = steps;
        self
    }

    pub fn state(&self) -> [f32; 4] {
        self.state
    }

    /// Overrides the state, e.g. to start from a known configuration.
    pub fn set_state(&mut self, state: [f32; 4]) {
        self.state = state;
        self.episode_steps = 0;
        self.steps_beyond_terminated = None;
    }

    fn is_failed(&self) -> bool {
        let [x, _, theta, _] = self.state;
        !(-X_THRESHOLD..=X_THRESHOLD).contains(&x)
            || !(-THETA_THRESHOLD_RADIANS..=THETA_THRESHOLD_RADIANS).contains(&theta)
    }

    fn integrate(&mut self, action: usize) {
        let [x, x_dot, theta, theta_dot] = self.state;
        let force = if action == 1 { FORCE_MAG } else { -FORCE_MAG };
        let (sin, cos) = theta.sin_cos();

        let temp = (force + POLE_MASS_LENGTH * theta_dot * theta_dot * sin) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin - cos * temp)
            / (LENGTH * (4.0 / 3.0 - MASS_POLE * cos * cos / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos / TOTAL_MASS;

        self.state = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];
    }
}

impl Environment for CartPole {
    fn observation_len(&self) -> usize {
        4
    }

    fn action_count(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Vec<f32> {
        for value in self.state.iter_mut() {
            *value = self.rng.gen_range_f32(-0.05, 0.05);
        }
        self.episode_steps = 0;
        self.steps_beyond_terminated = None;
        self.state.to_vec()
    }

    fn step(&mut self, action: usize) -> Step {
        self.integrate(action);
        self.episode_steps += 1;
        let terminated = self.is_failed();

        let reward = match (terminated, self.steps_beyond_terminated) {
            (false, _) => {
                if self.sutton_barto_reward {
                    0.0
                } else {
                    1.0
                }
            }
            (true, None) => {
                self.steps_beyond_terminated = Some(0);
                if self.sutton_barto_reward {
                    -1.0
                } else {
                    1.0
                }
            }
            (true, Some(beyond)) => {
                if beyond == 0 {
                    warn!(
                        "step() called after the episode terminated; call reset() first, \
                         further steps are undefined"
                    );
                }
                self.steps_beyond_terminated = Some(beyond + 1);
                if self.sutton_barto_reward {
                    -1.0
                } else {
                    0.0
                }
            }
        };

        Step {
            observation: self.state.to_vec(),
            reward,
            terminated,
            truncated: !terminated && self.episode_steps >= self.max_episode_steps,
        }
    }
}

//! Environment interface consumed by the agent.

/// One transition returned by [`Environment::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub observation: Vec<f32>,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
}

impl Step {
    /// Episode ended for either reason.
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Discrete-action environment.
pub trait Environment {
    /// Length of every observation vector.
    fn observation_len(&self) -> usize;

    /// Number of discrete actions.
    fn action_count(&self) -> usize;

    /// Starts a new episode and returns its first observation.
    fn reset(&mut self) -> Vec<f32>;

    fn step(&mut self, action: usize) -> Step;
}

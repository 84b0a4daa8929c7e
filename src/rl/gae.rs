//! Generalized Advantage Estimation.

/// Computes advantages and returns backwards through a rollout.
///
/// `dones[t]` marks that the episode ended *before* observation `t`, i.e. the
/// flag stored alongside it. `next_value` / `next_done` describe the state
/// following the last collected step.
///
/// ```text
/// δ_t = r_t + γ V(t+1) (1 − done_{t+1}) − V(t)
/// A_t = δ_t + γ λ (1 − done_{t+1}) A_{t+1}
/// R_t = A_t + V(t)
/// ```
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[f32],
    next_value: f32,
    next_done: f32,
    gamma: f32,
    lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let steps = rewards.len();
    let mut advantages = vec![0.0; steps];
    let mut returns = vec![0.0; steps];
    let mut last = 0.0;

    for t in (0..steps).rev() {
        let (next_non_terminal, next_values) = if t + 1 == steps {
            (1.0 - next_done, next_value)
        } else {
            (1.0 - dones[t + 1], values[t + 1])
        };
        let delta = rewards[t] + gamma * next_values * next_non_terminal - values[t];
        last = delta + gamma * lambda * next_non_terminal * last;
        advantages[t] = last;
        returns[t] = last + values[t];
    }
    (advantages, returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_terminal_cuts_bootstrap() {
        let (adv, ret) = compute_gae(&[1.0, 1.0], &[0.5, 0.5], &[0.0, 1.0], 10.0, 0.0, 0.9, 0.8);
        // Step 0 cannot see past the boundary at step 1.
        assert_abs_diff_eq!(adv[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(adv[1], 1.0 + 0.9 * 10.0 - 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(ret[0], 1.0, epsilon = 1e-6);
    }
}

//! Categorical action distribution with analytic Jacobians.
//!
//! A [`Categorical`] is built per forward pass from either logits or
//! probabilities for a whole batch. When gradients are requested it also keeps,
//! for every row, the `count × count` Jacobians of its normalised log
//! probabilities and probabilities with respect to the original input, laid
//! out as `[b][i][j] = ∂out_i / ∂in_j`.

use crate::error::{NnError, Result};
use crate::utils::activations::argmax;
use crate::utils::Rng;

/// Probabilities are clamped to `[EPS, 1 − EPS]` before taking the log.
pub const PROB_EPS: f32 = 2.220446e-16;

#[derive(Debug, Clone)]
pub struct Categorical {
    batch: usize,
    count: usize,
    probs: Vec<f32>,
    /// Normalised log probabilities.
    logits: Vec<f32>,
    d_logits: Option<Vec<f32>>,
    d_probs: Option<Vec<f32>>,
}

impl Categorical {
    /// Builds from whichever input is present; logits win when both are.
    ///
    /// Returns [`NnError::MissingDistributionInput`] when neither is given.
    pub fn new(
        logits: Option<&[f32]>,
        probs: Option<&[f32]>,
        batch: usize,
        with_grad: bool,
    ) -> Result<Self> {
        match (logits, probs) {
            (Some(logits), _) => Ok(Self::from_logits(logits, batch, with_grad)),
            (None, Some(probs)) => Ok(Self::from_probs(probs, batch, with_grad)),
            (None, None) => Err(NnError::MissingDistributionInput),
        }
    }

    /// Log-softmax and softmax of raw scores, row by row.
    ///
    /// Jacobians: `∂logsoftmax_i/∂x_j = δ_ij − softmax_j` and
    /// `∂softmax_i/∂x_j = softmax_i (δ_ij − softmax_j)`.
    pub fn from_logits(input: &[f32], batch: usize, with_grad: bool) -> Self {
        let count = row_width(input.len(), batch);
        let mut probs = vec![0.0; batch * count];
        let mut logits = vec![0.0; batch * count];
        let mut d_logits = with_grad.then(|| vec![0.0; batch * count * count]);
        let mut d_probs = with_grad.then(|| vec![0.0; batch * count * count]);

        for b in 0..batch {
            let x = &input[b * count..(b + 1) * count];
            let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let sum: f32 = x.iter().map(|&v| (v - max).exp()).sum();
            let log_sum = max + sum.ln();

            for i in 0..count {
                logits[b * count + i] = x[i] - log_sum;
                probs[b * count + i] = (x[i] - max).exp() / sum;
            }

            let p = &probs[b * count..(b + 1) * count];
            let block = b * count * count;
            if let Some(d_logits) = d_logits.as_mut() {
                for i in 0..count {
                    for j in 0..count {
                        let delta = if i == j { 1.0 } else { 0.0 };
                        d_logits[block + i * count + j] = delta - p[j];
                    }
                }
            }
            if let Some(d_probs) = d_probs.as_mut() {
                for i in 0..count {
                    for j in 0..count {
                        let delta = if i == j { 1.0 } else { 0.0 };
                        d_probs[block + i * count + j] = p[i] * (delta - p[j]);
                    }
                }
            }
        }

        Self {
            batch,
            count,
            probs,
            logits,
            d_logits,
            d_probs,
        }
    }

    /// Normalises unnormalised probabilities and derives clamped log
    /// probabilities.
    ///
    /// With `S = Σ q`: `∂p_i/∂q_j = (δ_ij − p_i) / S`. The log Jacobian is
    /// `(1/p_i) · ∂p_i/∂q_j`, zeroed for rows of `i` that were clamped.
    pub fn from_probs(input: &[f32], batch: usize, with_grad: bool) -> Self {
        let count = row_width(input.len(), batch);
        let mut probs = vec![0.0; batch * count];
        let mut logits = vec![0.0; batch * count];
        let mut d_logits = with_grad.then(|| vec![0.0; batch * count * count]);
        let mut d_probs = with_grad.then(|| vec![0.0; batch * count * count]);

        for b in 0..batch {
            let q = &input[b * count..(b + 1) * count];
            let sum: f32 = q.iter().sum();
            let block = b * count * count;

            for i in 0..count {
                let p = q[i] / sum;
                probs[b * count + i] = p;
                let clamped = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
                logits[b * count + i] = clamped.ln();

                if let (Some(d_probs), Some(d_logits)) = (d_probs.as_mut(), d_logits.as_mut()) {
                    let inside = (PROB_EPS..=1.0 - PROB_EPS).contains(&p);
                    let d_log = if inside { 1.0 / clamped } else { 0.0 };
                    for j in 0..count {
                        let delta = if i == j { 1.0 } else { 0.0 };
                        let dp = (delta - p) / sum;
                        d_probs[block + i * count + j] = dp;
                        d_logits[block + i * count + j] = d_log * dp;
                    }
                }
            }
        }

        Self {
            batch,
            count,
            probs,
            logits,
            d_logits,
            d_probs,
        }
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn probs(&self) -> &[f32] {
        &self.probs
    }

    pub fn logits(&self) -> &[f32] {
        &self.logits
    }

    /// `∂logits[b, i] / ∂input[b, j]`, if gradients were requested.
    pub fn logits_jacobian(&self) -> Option<&[f32]> {
        self.d_logits.as_deref()
    }

    /// `∂probs[b, i] / ∂input[b, j]`, if gradients were requested.
    pub fn probs_jacobian(&self) -> Option<&[f32]> {
        self.d_probs.as_deref()
    }

    /// Draws one category per row by walking the cumulative probabilities.
    ///
    /// Falls back to the last category when rounding keeps the cumulative sum
    /// at or below the draw.
    pub fn sample(&self, rng: &mut Rng) -> Vec<usize> {
        (0..self.batch)
            .map(|b| {
                let draw = rng.next_f32();
                self.sample_row(b, draw)
            })
            .collect()
    }

    /// Category selected in row `b` for the uniform draw `u ∈ [0, 1)`.
    pub fn sample_row(&self, b: usize, u: f32) -> usize {
        let row = &self.probs[b * self.count..(b + 1) * self.count];
        let mut cumulative = 0.0f32;
        for (i, &p) in row.iter().enumerate() {
            cumulative += p;
            if cumulative > u {
                return i;
            }
        }
        self.count.saturating_sub(1)
    }

    /// Most probable category per row.
    pub fn mode(&self) -> Vec<usize> {
        self.probs.chunks(self.count.max(1)).map(argmax).collect()
    }

    /// Log probability of `actions[b]` in each row.
    ///
    /// When `grad` is given (length `batch × count`) it receives
    /// `∂logp_b / ∂input[b, j]`, i.e. row `actions[b]` of the log Jacobian.
    ///
    /// # Panics
    ///
    /// Panics if `grad` is requested on a distribution built without gradients.
    pub fn log_prob(&self, actions: &[usize], grad: Option<&mut [f32]>) -> Vec<f32> {
        let count = self.count;
        let result = (0..self.batch)
            .map(|b| self.logits[b * count + actions[b]])
            .collect();

        if let Some(grad) = grad {
            let jacobian = self.require_jacobian(&self.d_logits);
            for b in 0..self.batch {
                let row = (b * count + actions[b]) * count;
                grad[b * count..(b + 1) * count].copy_from_slice(&jacobian[row..row + count]);
            }
        }
        result
    }

    /// Entropy `−Σ_i p_i · logits_i` of each row.
    ///
    /// When `grad` is given it receives
    /// `∂H_b/∂input_j = −Σ_i (logits_i · ∂p_i/∂input_j + p_i · ∂logits_i/∂input_j)`.
    pub fn entropy(&self, grad: Option<&mut [f32]>) -> Vec<f32> {
        let count = self.count;
        let result = (0..self.batch)
            .map(|b| {
                let p = &self.probs[b * count..(b + 1) * count];
                let l = &self.logits[b * count..(b + 1) * count];
                -p.iter().zip(l).map(|(&pi, &li)| pi * li).sum::<f32>()
            })
            .collect();

        if let Some(grad) = grad {
            let d_logits = self.require_jacobian(&self.d_logits);
            let d_probs = self.require_jacobian(&self.d_probs);
            grad[..self.batch * count].fill(0.0);
            for b in 0..self.batch {
                let block = b * count * count;
                for i in 0..count {
                    let p = self.probs[b * count + i];
                    let l = self.logits[b * count + i];
                    for j in 0..count {
                        let k = block + i * count + j;
                        grad[b * count + j] -= l * d_probs[k] + p * d_logits[k];
                    }
                }
            }
        }
        result
    }

    fn require_jacobian<'a>(&self, jacobian: &'a Option<Vec<f32>>) -> &'a [f32] {
        match jacobian {
            Some(values) => values,
            None => panic!("categorical gradient requested without `with_grad`"),
        }
    }
}

fn row_width(len: usize, batch: usize) -> usize {
    if batch == 0 {
        0
    } else {
        len / batch
    }
}

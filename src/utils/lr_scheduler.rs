//! Learning rate scheduler trait and implementations
//!
//! Schedulers map a training iteration to the learning rate used for every
//! optimizer step inside that iteration.

/// Core trait for learning rate schedulers.
///
/// Schedulers adjust the learning rate during training based on the current
/// iteration counter.
///
/// # Example
///
/// ```ignore
/// let mut scheduler = LinearAnnealing::new(2.5e-4, 4000);
///
/// for iteration in 0..num_iterations {
///     let lr = scheduler.get_lr();
///     // ... train with current learning rate ...
///     scheduler.step();
/// }
/// ```
pub trait LrScheduler {
    /// Get the current learning rate.
    fn get_lr(&self) -> f32;

    /// Advance the scheduler to the next iteration.
    fn step(&mut self);

    /// Jump directly to a zero-based iteration.
    fn set_iteration(&mut self, iteration: usize);

    /// Reset the scheduler to its initial state.
    fn reset(&mut self) {
        self.set_iteration(0);
    }
}

/// Learning rate that never changes.
pub struct ConstantLr {
    lr: f32,
}

impl ConstantLr {
    pub fn new(lr: f32) -> Self {
        Self { lr }
    }
}

impl LrScheduler for ConstantLr {
    fn get_lr(&self) -> f32 {
        self.lr
    }

    fn step(&mut self) {}

    fn set_iteration(&mut self, _iteration: usize) {}
}

/// Linear annealing from `initial_lr` towards zero over `max_iterations`.
///
/// Formula with a one-based iteration `k = iteration + 1`:
/// `lr = initial_lr · (1 − (min(k, max_iterations) − 1) / max_iterations)`
///
/// The first iteration trains at exactly `initial_lr` and the rate stays at
/// `initial_lr / max_iterations` once the horizon is passed.
///
/// # Example
///
/// ```
/// use neural_ppo::utils::lr_scheduler::{LinearAnnealing, LrScheduler};
///
/// let mut scheduler = LinearAnnealing::new(1.0, 4);
/// assert_eq!(scheduler.get_lr(), 1.0);
/// scheduler.step();
/// assert_eq!(scheduler.get_lr(), 0.75);
/// ```
pub struct LinearAnnealing {
    initial_lr: f32,
    max_iterations: usize,
    iteration: usize,
    current_lr: f32,
}

impl LinearAnnealing {
    pub fn new(initial_lr: f32, max_iterations: usize) -> Self {
        let mut scheduler = Self {
            initial_lr,
            max_iterations: max_iterations.max(1),
            iteration: 0,
            current_lr: initial_lr,
        };
        scheduler.recompute();
        scheduler
    }

    fn recompute(&mut self) {
        let k = (self.iteration + 1).min(self.max_iterations) as f32;
        let frac = 1.0 - (k - 1.0) / self.max_iterations as f32;
        self.current_lr = frac * self.initial_lr;
    }
}

impl LrScheduler for LinearAnnealing {
    fn get_lr(&self) -> f32 {
        self.current_lr
    }

    fn step(&mut self) {
        self.iteration += 1;
        self.recompute();
    }

    fn set_iteration(&mut self, iteration: usize) {
        self.iteration = iteration;
        self.recompute();
    }
}

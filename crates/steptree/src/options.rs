//! Injectable randomness and time sources.

use std::fmt;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Returns a value in `[0, 1)`.
pub type RandomFn = Box<dyn FnMut() -> f64 + Send>;

/// Returns the seconds elapsed since the previous step.
pub type DeltaTimeFn = Box<dyn FnMut() -> f64 + Send>;

/// Per-tree configuration.
///
/// # Defaults
///
/// - `random`: thread-local `rand` generator
/// - `delta_time`: wall-clock time between steps (zero on the first step)
///
/// The delta source is sampled exactly once per step, and that delta is what
/// every wait node sees during the step.
pub struct TreeOptions {
    pub(crate) random: RandomFn,
    pub(crate) delta_time: DeltaTimeFn,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            random: Box::new(rand::random::<f64>),
            delta_time: wall_clock(),
        }
    }
}

impl TreeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the random source used by lotto, repeat, retry and wait.
    pub fn with_random<F>(mut self, random: F) -> Self
    where
        F: FnMut() -> f64 + Send + 'static,
    {
        self.random = Box::new(random);
        self
    }

    /// Uses a seeded generator so random draws repeat across runs.
    pub fn with_seed(self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.with_random(move || rng.r#gen::<f64>())
    }

    /// Replaces the delta time source.
    pub fn with_delta_time<F>(mut self, delta_time: F) -> Self
    where
        F: FnMut() -> f64 + Send + 'static,
    {
        self.delta_time = Box::new(delta_time);
        self
    }
}

impl fmt::Debug for TreeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeOptions").finish_non_exhaustive()
    }
}

fn wall_clock() -> DeltaTimeFn {
    let mut previous: Option<Instant> = None;
    Box::new(move || {
        let now = Instant::now();
        let delta = previous.map(|last| now - last).unwrap_or_default();
        previous = Some(now);
        delta.as_secs_f64()
    })
}

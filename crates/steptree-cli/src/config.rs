//! Run configuration for the tree runner.
use std::env;
use std::time::Duration;

/// How long and how fast a tree is driven.
///
/// Values come from the environment first and are then overridden by
/// command line flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Upper bound on steps before the runner gives up on a running tree.
    pub max_steps: usize,
    /// Delay between consecutive steps.
    pub step_interval: Duration,
    /// Seed for the tree's random source; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            step_interval: Duration::from_millis(50),
            seed: None,
        }
    }
}

impl RunConfig {
    /// Construct run configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STEPTREE_MAX_STEPS` - Step limit (default: 100, minimum 1)
    /// - `STEPTREE_STEP_INTERVAL_MS` - Delay between steps (default: 50)
    /// - `STEPTREE_SEED` - Seed for reproducible random draws (default: unset)
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key)?.trim().parse::<u64>().ok();
        let mut config = Self::default();

        if let Some(steps) = read("STEPTREE_MAX_STEPS") {
            config.max_steps = (steps as usize).max(1);
        }
        if let Some(millis) = read("STEPTREE_STEP_INTERVAL_MS") {
            config.step_interval = Duration::from_millis(millis);
        }
        if let Some(seed) = read("STEPTREE_SEED") {
            config.seed = Some(seed);
        }

        config
    }

    /// Applies command line overrides on top of this configuration.
    pub fn with_overrides(
        mut self,
        max_steps: Option<usize>,
        interval_ms: Option<u64>,
        seed: Option<u64>,
    ) -> Self {
        if let Some(steps) = max_steps {
            self.max_steps = steps.max(1);
        }
        if let Some(millis) = interval_ms {
            self.step_interval = Duration::from_millis(millis);
        }
        if seed.is_some() {
            self.seed = seed;
        }
        self
    }
}

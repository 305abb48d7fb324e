//! Execution budgets of worker invocations.

use std::time::Duration;

/// Decides how much work one worker invocation may do.
///
/// `trials_done` counts trials completed in the current invocation only.
pub trait ExecutionBudget: Send + Sync {
    /// Whether the next trial is expected to finish within the budget.
    fn admits_next(&self, elapsed: Duration, trials_done: u64) -> bool;

    /// Whether the hard deadline passed while the in-flight trial ran.
    /// The trial is then discarded, unless it is the first of the invocation.
    fn interrupted(&self, _elapsed: Duration, _trials_done: u64) -> bool {
        false
    }
}

/// Runs every batch to completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl ExecutionBudget for Unbounded {
    fn admits_next(&self, _elapsed: Duration, _trials_done: u64) -> bool {
        true
    }
}

/// Wall-clock budget projected from the running average time per trial.
#[derive(Debug, Clone, Copy)]
pub struct WallClockBudget {
    limit: Duration,
}

impl WallClockBudget {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

impl ExecutionBudget for WallClockBudget {
    fn admits_next(&self, elapsed: Duration, trials_done: u64) -> bool {
        if trials_done == 0 {
            return elapsed < self.limit;
        }
        let per_trial = elapsed.as_secs_f64() / trials_done as f64;
        elapsed.as_secs_f64() + per_trial <= self.limit.as_secs_f64()
    }

    fn interrupted(&self, elapsed: Duration, _trials_done: u64) -> bool {
        elapsed > self.limit
    }
}

/// Allows a fixed number of trials per invocation.
#[derive(Debug, Clone, Copy)]
pub struct TrialBudget {
    max_trials: u64,
}

impl TrialBudget {
    pub fn new(max_trials: u64) -> Self {
        Self { max_trials }
    }
}

impl ExecutionBudget for TrialBudget {
    fn admits_next(&self, _elapsed: Duration, trials_done: u64) -> bool {
        trials_done < self.max_trials
    }
}

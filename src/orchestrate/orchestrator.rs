//! Run-level control: submit batches, drain the queue, join at the barrier.

use super::batch::{partition_trials, BatchState, PermutationBatch, Tally};
use super::budget::{ExecutionBudget, Unbounded, WallClockBudget};
use super::dispatch::{BatchJob, JobDispatcher, LocalQueue};
use super::store::BatchStore;
use super::worker::{run_job, TrialRunner, WorkerOutcome};
use crate::config::ExecutionConfig;
use crate::error::{CoremicError, Result};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A submitted permutation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: String,
    /// Trials requested.
    pub total_trials: u64,
    pub n_batches: usize,
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<T> {
    /// Every trial committed; carries the finalizer's output.
    Completed(T),
    /// Cancelled before the barrier; the finalizer was not called.
    Cancelled,
}

impl<T> RunOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }
}

/// Splits permutation trials into batches, runs them on the rayon pool with
/// a per-invocation budget, and aggregates once every batch has completed.
pub struct Orchestrator<S: BatchStore> {
    store: S,
    queue: LocalQueue,
    workers: usize,
    max_rounds: usize,
    budget: Box<dyn ExecutionBudget>,
}

impl<S: BatchStore> Orchestrator<S> {
    /// Orchestrator over `store`, configured by `config`.
    pub fn new(store: S, config: &ExecutionConfig) -> Self {
        let budget: Box<dyn ExecutionBudget> = match config.worker_budget_ms {
            Some(ms) => Box::new(WallClockBudget::from_millis(ms)),
            None => Box::new(Unbounded),
        };
        Self {
            store,
            queue: LocalQueue::new(),
            workers: config.workers.max(1),
            max_rounds: config.max_rounds.max(1),
            budget,
        }
    }

    /// Replace the per-invocation budget.
    pub fn with_budget<B: ExecutionBudget + 'static>(mut self, budget: B) -> Self {
        self.budget = Box::new(budget);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn queue(&self) -> &LocalQueue {
        &self.queue
    }

    /// Create pending batches for `total_trials` and enqueue one job each.
    pub fn submit<R: TrialRunner + ?Sized>(&self, total_trials: u64, runner: &R) -> Result<RunHandle> {
        if total_trials == 0 {
            return Err(CoremicError::InvalidParameter(
                "trial count must be positive".to_string(),
            ));
        }
        let run_id = Uuid::new_v4().to_string();
        let (n_thresholds, n_otus) = runner.tally_shape();
        let ranges = partition_trials(total_trials, self.workers);

        for (batch_id, &(start, count)) in ranges.iter().enumerate() {
            let batch = PermutationBatch::pending(
                batch_id,
                start,
                count,
                Tally::new(n_thresholds, n_otus),
            );
            self.store.put(&run_id, &batch)?;
            self.queue.enqueue(BatchJob {
                run_id: run_id.clone(),
                batch_id,
                start,
                count,
            })?;
        }
        info!(
            run_id = %run_id,
            trials = total_trials,
            batches = ranges.len(),
            "permutation run submitted"
        );
        Ok(RunHandle {
            run_id,
            total_trials,
            n_batches: ranges.len(),
        })
    }

    /// Re-attach to a run whose batch records are already in the store,
    /// such as a [`FileStore`](super::FileStore) left behind by a process
    /// that stopped mid-run.
    ///
    /// Every unfinished batch is enqueued again from its stored cursor.
    /// `runner` must use the run's seed so resumed trials continue the
    /// committed ones.
    ///
    /// # Errors
    /// - `Store` if the store holds no batch of `run_id`.
    /// - `Cancelled` if the run was cancelled.
    /// - `ResumeFailed` if the stored batches do not tile `0..N`.
    /// - `DimensionMismatch` if a stored tally does not fit `runner`.
    pub fn resume<R: TrialRunner + ?Sized>(&self, run_id: &str, runner: &R) -> Result<RunHandle> {
        if self.store.is_cancelled(run_id)? {
            return Err(CoremicError::Cancelled(run_id.to_string()));
        }
        let batches = self.store.list(run_id)?;
        if batches.is_empty() {
            return Err(CoremicError::Store(format!("no stored batches for run {}", run_id)));
        }

        let shape = runner.tally_shape();
        let mut next_start = 0;
        for (expected_id, batch) in batches.iter().enumerate() {
            if batch.batch_id != expected_id || batch.start != next_start {
                return Err(CoremicError::ResumeFailed {
                    run_id: run_id.to_string(),
                    batch_id: batch.batch_id,
                    reason: format!("expected batch {} starting at trial {}", expected_id, next_start),
                });
            }
            if batch.tally.shape() != shape {
                return Err(CoremicError::DimensionMismatch {
                    expected: shape.0 * shape.1,
                    actual: batch.tally.n_thresholds() * batch.tally.n_otus(),
                });
            }
            next_start = batch.end();
        }

        let mut requeued = 0;
        for batch in batches.iter().filter(|b| b.state != BatchState::Completed) {
            self.queue.enqueue(BatchJob {
                run_id: run_id.to_string(),
                batch_id: batch.batch_id,
                start: batch.cursor,
                count: batch.remaining(),
            })?;
            requeued += 1;
        }
        info!(
            run_id = %run_id,
            trials = next_start,
            batches = batches.len(),
            requeued,
            "permutation run resumed"
        );
        Ok(RunHandle {
            run_id: run_id.to_string(),
            total_trials: next_start,
            n_batches: batches.len(),
        })
    }

    /// Flag the run as cancelled. In-flight workers stop at their next
    /// trial boundary and mark their batch `Cancelled`.
    pub fn cancel(&self, run: &RunHandle) -> Result<()> {
        warn!(run_id = %run.run_id, "cancelling run");
        self.store.cancel(&run.run_id)
    }

    /// Drain the run's jobs round by round, executing each round in
    /// parallel, until the queue holds none of its jobs, the run is
    /// cancelled, or `max_rounds` rounds have run. Returns rounds used.
    pub fn drive<R: TrialRunner + ?Sized>(&self, run: &RunHandle, runner: &R) -> Result<usize> {
        let budget = self.budget.as_ref();
        for round in 0..self.max_rounds {
            if self.store.is_cancelled(&run.run_id)? {
                return Ok(round);
            }
            let jobs = self.queue.drain_run(&run.run_id);
            if jobs.is_empty() {
                return Ok(round);
            }
            debug!(run_id = %run.run_id, round, jobs = jobs.len(), "draining queue");

            let outcomes = jobs
                .par_iter()
                .map(|job| run_job(job, runner, &self.store, &self.queue, budget))
                .collect::<Result<Vec<WorkerOutcome>>>()?;
            let checkpointed = outcomes
                .iter()
                .filter(|o| matches!(o, WorkerOutcome::Checkpointed { .. }))
                .count();
            if checkpointed > 0 {
                debug!(run_id = %run.run_id, round, checkpointed, "batches resumed next round");
            }
        }
        Ok(self.max_rounds)
    }

    /// Counting barrier. Once every batch is `Completed` and the committed
    /// trials sum to the requested count, fold the tallies, delete the run's
    /// records, and hand the aggregate to `finalize`.
    ///
    /// # Errors
    /// `IncompleteRun` while any batch is unfinished.
    pub fn join<T, F>(&self, run: &RunHandle, finalize: F) -> Result<RunOutcome<T>>
    where
        F: FnOnce(Tally) -> Result<T>,
    {
        if self.store.is_cancelled(&run.run_id)? {
            self.discard(run)?;
            warn!(run_id = %run.run_id, "run cancelled, results discarded");
            return Ok(RunOutcome::Cancelled);
        }

        let batches = self.store.list(&run.run_id)?;
        let committed: u64 = batches
            .iter()
            .filter(|b| b.state == BatchState::Completed)
            .map(|b| b.committed())
            .sum();
        let all_complete = batches.len() == run.n_batches
            && batches.iter().all(|b| b.state == BatchState::Completed);
        if !all_complete || committed != run.total_trials {
            return Err(CoremicError::IncompleteRun {
                committed: committed as usize,
                expected: run.total_trials as usize,
            });
        }

        let mut batches = batches.into_iter();
        let mut aggregate = match batches.next() {
            Some(first) => first.tally,
            None => {
                return Err(CoremicError::IncompleteRun {
                    committed: 0,
                    expected: run.total_trials as usize,
                })
            }
        };
        for batch in batches {
            aggregate.merge(&batch.tally)?;
        }
        self.store.delete_all(&run.run_id)?;
        info!(run_id = %run.run_id, trials = committed, "permutation run aggregated");

        finalize(aggregate).map(RunOutcome::Completed)
    }

    /// Drop every stored record and queued job of the run.
    pub fn discard(&self, run: &RunHandle) -> Result<()> {
        self.queue.drain_run(&run.run_id);
        self.store.delete_all(&run.run_id)
    }

    /// Submit, drive and join in one call.
    pub fn run<R, T, F>(&self, total_trials: u64, runner: &R, finalize: F) -> Result<RunOutcome<T>>
    where
        R: TrialRunner + ?Sized,
        F: FnOnce(Tally) -> Result<T>,
    {
        let handle = self.submit(total_trials, runner)?;
        self.drive(&handle, runner)?;
        self.join(&handle, finalize)
    }
}

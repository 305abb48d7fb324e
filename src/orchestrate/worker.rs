//! One worker invocation over one batch job.

use super::batch::{BatchState, PermutationBatch};
use super::budget::ExecutionBudget;
use super::dispatch::{BatchJob, JobDispatcher};
use super::store::BatchStore;
use crate::error::{CoremicError, Result};
use std::time::Instant;
use tracing::{debug, warn};

/// Source of trial results for a batch.
///
/// A trial is identified by its global index, so the same index yields the
/// same hits no matter which batch or invocation runs it.
pub trait TrialRunner: Sync {
    /// `(thresholds, otus)` of the tally this runner fills.
    fn tally_shape(&self) -> (usize, usize);

    /// For each threshold, the OTU rows that were core in trial `index`.
    fn run_trial(&self, index: u64) -> Vec<Vec<usize>>;
}

/// How a worker invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Every trial of the batch is committed.
    Completed,
    /// Budget exhausted; a continuation starting at `cursor` was enqueued.
    Checkpointed { cursor: u64 },
    /// The run was cancelled. A batch already started is stored as
    /// `Cancelled`; its tally never reaches the barrier.
    Cancelled,
    /// A duplicate delivery for a batch that already finished.
    AlreadyComplete,
}

/// Run trials of `job` until the batch completes or the budget runs out.
///
/// Trials start at `max(job.start, stored cursor)`. A trial's hits are
/// added to the tally only after it finishes inside the budget, so an
/// interrupted trial is simply run again by the continuation. The first
/// trial of an invocation is always committed, so a trial slower than the
/// whole budget still moves the cursor.
///
/// # Errors
/// - `ResumeFailed` if the batch record is missing or a continuation cannot
///   be enqueued.
/// - Store errors are propagated.
pub fn run_job<R: TrialRunner + ?Sized>(
    job: &BatchJob,
    runner: &R,
    store: &dyn BatchStore,
    dispatcher: &dyn JobDispatcher,
    budget: &dyn ExecutionBudget,
) -> Result<WorkerOutcome> {
    if store.is_cancelled(&job.run_id)? {
        return Ok(WorkerOutcome::Cancelled);
    }

    let mut batch = store
        .get(&job.run_id, job.batch_id)?
        .ok_or_else(|| CoremicError::ResumeFailed {
            run_id: job.run_id.clone(),
            batch_id: job.batch_id,
            reason: "batch record not found".to_string(),
        })?;
    if batch.state == BatchState::Completed {
        debug!(batch = job.batch_id, "duplicate job for completed batch");
        return Ok(WorkerOutcome::AlreadyComplete);
    }

    batch.cursor = batch.cursor.max(job.start).min(batch.end());
    batch.state = if batch.committed() > 0 {
        BatchState::Resumed
    } else {
        BatchState::Running
    };
    store.put(&job.run_id, &batch)?;
    debug!(
        batch = batch.batch_id,
        cursor = batch.cursor,
        end = batch.end(),
        state = ?batch.state,
        "worker started"
    );

    let started = Instant::now();
    let mut done: u64 = 0;
    while batch.cursor < batch.end() {
        if store.is_cancelled(&job.run_id)? {
            batch.state = BatchState::Cancelled;
            store.put(&job.run_id, &batch)?;
            warn!(batch = batch.batch_id, cursor = batch.cursor, "run cancelled, worker stopping");
            return Ok(WorkerOutcome::Cancelled);
        }
        if !budget.admits_next(started.elapsed(), done) {
            return checkpoint(&job.run_id, &mut batch, store, dispatcher);
        }

        let hits = runner.run_trial(batch.cursor);
        if done > 0 && budget.interrupted(started.elapsed(), done) {
            debug!(batch = batch.batch_id, trial = batch.cursor, "trial interrupted, discarded");
            return checkpoint(&job.run_id, &mut batch, store, dispatcher);
        }
        batch.tally.record(&hits);
        batch.cursor += 1;
        done += 1;
    }

    batch.state = BatchState::Completed;
    store.put(&job.run_id, &batch)?;
    debug!(
        batch = batch.batch_id,
        trials = done,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch completed"
    );
    Ok(WorkerOutcome::Completed)
}

fn checkpoint(
    run_id: &str,
    batch: &mut PermutationBatch,
    store: &dyn BatchStore,
    dispatcher: &dyn JobDispatcher,
) -> Result<WorkerOutcome> {
    batch.state = BatchState::Checkpointed;
    store.put(run_id, batch)?;

    let continuation = BatchJob {
        run_id: run_id.to_string(),
        batch_id: batch.batch_id,
        start: batch.cursor,
        count: batch.remaining(),
    };
    dispatcher
        .enqueue(continuation)
        .map_err(|e| CoremicError::ResumeFailed {
            run_id: run_id.to_string(),
            batch_id: batch.batch_id,
            reason: e.to_string(),
        })?;

    warn!(
        batch = batch.batch_id,
        cursor = batch.cursor,
        remaining = batch.remaining(),
        "budget exhausted, batch checkpointed"
    );
    Ok(WorkerOutcome::Checkpointed {
        cursor: batch.cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrate::batch::Tally;
    use crate::orchestrate::budget::{TrialBudget, Unbounded, WallClockBudget};
    use crate::orchestrate::dispatch::LocalQueue;
    use crate::orchestrate::store::MemoryStore;
    use std::thread;
    use std::time::Duration;

    /// Trial `i` hits OTU `i % 3` at the single threshold.
    struct ModuloRunner;

    impl TrialRunner for ModuloRunner {
        fn tally_shape(&self) -> (usize, usize) {
            (1, 3)
        }

        fn run_trial(&self, index: u64) -> Vec<Vec<usize>> {
            vec![vec![(index % 3) as usize]]
        }
    }

    /// Each trial takes `delay`.
    struct SlowRunner {
        delay: Duration,
    }

    impl TrialRunner for SlowRunner {
        fn tally_shape(&self) -> (usize, usize) {
            (1, 3)
        }

        fn run_trial(&self, index: u64) -> Vec<Vec<usize>> {
            thread::sleep(self.delay);
            vec![vec![(index % 3) as usize]]
        }
    }

    /// Sets the cancellation flag of `run` while trial `at` runs.
    struct CancellingRunner<'a> {
        store: &'a MemoryStore,
        at: u64,
    }

    impl TrialRunner for CancellingRunner<'_> {
        fn tally_shape(&self) -> (usize, usize) {
            (1, 3)
        }

        fn run_trial(&self, index: u64) -> Vec<Vec<usize>> {
            if index == self.at {
                self.store.cancel("run").unwrap();
            }
            vec![vec![(index % 3) as usize]]
        }
    }

    struct FailingDispatcher;

    impl JobDispatcher for FailingDispatcher {
        fn enqueue(&self, _job: BatchJob) -> Result<()> {
            Err(CoremicError::Store("queue unavailable".to_string()))
        }
    }

    /// Hard deadline hits while the trial after `after` completed trials runs.
    struct DeadlineAfter {
        after: u64,
    }

    impl ExecutionBudget for DeadlineAfter {
        fn admits_next(&self, _elapsed: Duration, _trials_done: u64) -> bool {
            true
        }

        fn interrupted(&self, _elapsed: Duration, trials_done: u64) -> bool {
            trials_done == self.after
        }
    }

    fn setup(start: u64, count: u64) -> (MemoryStore, LocalQueue, BatchJob) {
        let store = MemoryStore::new();
        store
            .put("run", &PermutationBatch::pending(0, start, count, Tally::new(1, 3)))
            .unwrap();
        let job = BatchJob {
            run_id: "run".to_string(),
            batch_id: 0,
            start,
            count,
        };
        (store, LocalQueue::new(), job)
    }

    #[test]
    fn test_runs_to_completion() {
        let (store, queue, job) = setup(0, 20);
        let outcome = run_job(&job, &ModuloRunner, &store, &queue, &Unbounded).unwrap();
        assert_eq!(outcome, WorkerOutcome::Completed);

        let batch = store.get("run", 0).unwrap().unwrap();
        assert_eq!(batch.state, BatchState::Completed);
        assert_eq!(batch.cursor, 20);
        assert_eq!(batch.tally.count(0, 0), 7);
        assert_eq!(batch.tally.count(0, 1), 7);
        assert_eq!(batch.tally.count(0, 2), 6);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_checkpoint_and_resume_matches_uninterrupted() {
        let (store, queue, job) = setup(0, 20);
        let outcome = run_job(&job, &ModuloRunner, &store, &queue, &TrialBudget::new(13)).unwrap();
        assert_eq!(outcome, WorkerOutcome::Checkpointed { cursor: 13 });

        let checkpointed = store.get("run", 0).unwrap().unwrap();
        assert_eq!(checkpointed.state, BatchState::Checkpointed);
        assert_eq!(checkpointed.committed(), 13);

        let continuation = queue.drain_run("run");
        assert_eq!(
            continuation,
            vec![BatchJob {
                run_id: "run".to_string(),
                batch_id: 0,
                start: 13,
                count: 7
            }]
        );
        let outcome =
            run_job(&continuation[0], &ModuloRunner, &store, &queue, &Unbounded).unwrap();
        assert_eq!(outcome, WorkerOutcome::Completed);

        let (reference_store, reference_queue, reference_job) = setup(0, 20);
        run_job(
            &reference_job,
            &ModuloRunner,
            &reference_store,
            &reference_queue,
            &Unbounded,
        )
        .unwrap();
        assert_eq!(
            store.get("run", 0).unwrap().unwrap().tally,
            reference_store.get("run", 0).unwrap().unwrap().tally
        );
    }

    #[test]
    fn test_interrupted_trial_is_discarded() {
        let (store, queue, job) = setup(0, 10);
        let outcome =
            run_job(&job, &ModuloRunner, &store, &queue, &DeadlineAfter { after: 4 }).unwrap();
        assert_eq!(outcome, WorkerOutcome::Checkpointed { cursor: 4 });

        let batch = store.get("run", 0).unwrap().unwrap();
        // Trials 0..4 committed, trial 4 ran but was dropped
        assert_eq!(batch.tally.count(0, 0), 2);
        assert_eq!(batch.tally.count(0, 1), 1);
        assert_eq!(batch.tally.count(0, 2), 1);
        assert_eq!(queue.drain_run("run")[0].start, 4);
    }

    #[test]
    fn test_trial_longer_than_budget_still_progresses() {
        let (store, queue, job) = setup(0, 5);
        let runner = SlowRunner {
            delay: Duration::from_millis(15),
        };
        let budget = WallClockBudget::from_millis(10);

        let outcome = run_job(&job, &runner, &store, &queue, &budget).unwrap();
        assert_eq!(outcome, WorkerOutcome::Checkpointed { cursor: 1 });

        let mut outcomes = Vec::new();
        for _ in 0..4 {
            let next = queue.drain_run("run").remove(0);
            outcomes.push(run_job(&next, &runner, &store, &queue, &budget).unwrap());
        }
        assert_eq!(outcomes.last(), Some(&WorkerOutcome::Completed));
        let batch = store.get("run", 0).unwrap().unwrap();
        assert_eq!(batch.state, BatchState::Completed);
        assert_eq!(batch.committed(), 5);
    }

    #[test]
    fn test_first_trial_survives_deadline() {
        let (store, queue, job) = setup(0, 10);
        let outcome =
            run_job(&job, &ModuloRunner, &store, &queue, &DeadlineAfter { after: 0 }).unwrap();
        assert_eq!(outcome, WorkerOutcome::Completed);
        assert_eq!(store.get("run", 0).unwrap().unwrap().committed(), 10);
    }

    #[test]
    fn test_stale_job_resumes_from_stored_cursor() {
        let (store, queue, job) = setup(0, 10);
        run_job(&job, &ModuloRunner, &store, &queue, &TrialBudget::new(6)).unwrap();
        // Redelivery of the original job must not recount trials 0..6
        let outcome = run_job(&job, &ModuloRunner, &store, &queue, &Unbounded).unwrap();
        assert_eq!(outcome, WorkerOutcome::Completed);
        let batch = store.get("run", 0).unwrap().unwrap();
        assert_eq!(batch.tally.count(0, 0) + batch.tally.count(0, 1) + batch.tally.count(0, 2), 10);

        let again = run_job(&job, &ModuloRunner, &store, &queue, &Unbounded).unwrap();
        assert_eq!(again, WorkerOutcome::AlreadyComplete);
    }

    #[test]
    fn test_cancelled_run_commits_nothing() {
        let (store, queue, job) = setup(0, 10);
        store.cancel("run").unwrap();
        let outcome = run_job(&job, &ModuloRunner, &store, &queue, &Unbounded).unwrap();
        assert_eq!(outcome, WorkerOutcome::Cancelled);
        let batch = store.get("run", 0).unwrap().unwrap();
        assert_eq!(batch.state, BatchState::Pending);
        assert_eq!(batch.committed(), 0);
    }

    #[test]
    fn test_cancel_between_trials_marks_batch() {
        let (store, queue, job) = setup(0, 10);
        let runner = CancellingRunner {
            store: &store,
            at: 3,
        };
        let outcome = run_job(&job, &runner, &store, &queue, &Unbounded).unwrap();
        assert_eq!(outcome, WorkerOutcome::Cancelled);

        let batch = store.get("run", 0).unwrap().unwrap();
        assert_eq!(batch.state, BatchState::Cancelled);
        // Trial 3 finished before the flag was seen
        assert_eq!(batch.cursor, 4);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_enqueue_failure_is_resume_failed() {
        let (store, _, job) = setup(0, 10);
        let err = run_job(&job, &ModuloRunner, &store, &FailingDispatcher, &TrialBudget::new(3))
            .unwrap_err();
        assert!(matches!(err, CoremicError::ResumeFailed { batch_id: 0, .. }));
    }

    #[test]
    fn test_missing_batch_record() {
        let store = MemoryStore::new();
        let job = BatchJob {
            run_id: "run".to_string(),
            batch_id: 9,
            start: 0,
            count: 1,
        };
        let err = run_job(&job, &ModuloRunner, &store, &LocalQueue::new(), &Unbounded).unwrap_err();
        assert!(matches!(err, CoremicError::ResumeFailed { batch_id: 9, .. }));
    }
}

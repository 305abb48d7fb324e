//! Chunked execution of permutation trials.
//!
//! A run of `N` trials is split into batches. Each batch is advanced by
//! worker invocations that stop when their execution budget runs out,
//! checkpoint their tally and cursor to a [`BatchStore`], and enqueue a
//! continuation through a [`JobDispatcher`]. The [`Orchestrator`] keeps
//! draining jobs until none remain, then aggregates at a counting barrier.

pub mod batch;
pub mod budget;
pub mod dispatch;
pub mod orchestrator;
pub mod store;
pub mod worker;

pub use batch::{partition_trials, BatchState, PermutationBatch, Tally};
pub use budget::{ExecutionBudget, TrialBudget, Unbounded, WallClockBudget};
pub use dispatch::{BatchJob, JobDispatcher, LocalQueue};
pub use orchestrator::{Orchestrator, RunHandle, RunOutcome};
pub use store::{BatchStore, FileStore, MemoryStore};
pub use worker::{run_job, TrialRunner, WorkerOutcome};

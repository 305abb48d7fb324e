//! Job dispatch for batch continuations.

use crate::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Work order for one worker invocation: run trials
/// `start..start + count` of batch `batch_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub run_id: String,
    pub batch_id: usize,
    pub start: u64,
    pub count: u64,
}

/// Delivers jobs to workers.
///
/// Delivery is at-least-once and unordered; workers tolerate duplicates by
/// resuming from the stored cursor.
pub trait JobDispatcher: Send + Sync {
    fn enqueue(&self, job: BatchJob) -> Result<()>;
}

/// In-process FIFO queue.
#[derive(Debug, Default)]
pub struct LocalQueue {
    jobs: Mutex<VecDeque<BatchJob>>,
}

impl LocalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued job of `run_id`, leaving other runs' jobs queued.
    pub fn drain_run(&self, run_id: &str) -> Vec<BatchJob> {
        let mut jobs = self.jobs.lock();
        let (mine, others): (VecDeque<BatchJob>, VecDeque<BatchJob>) =
            jobs.drain(..).partition(|job| job.run_id == run_id);
        *jobs = others;
        mine.into()
    }

    /// Queued jobs of `run_id`.
    pub fn pending(&self, run_id: &str) -> usize {
        self.jobs.lock().iter().filter(|j| j.run_id == run_id).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

impl JobDispatcher for LocalQueue {
    fn enqueue(&self, job: BatchJob) -> Result<()> {
        self.jobs.lock().push_back(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(run_id: &str, batch_id: usize) -> BatchJob {
        BatchJob {
            run_id: run_id.to_string(),
            batch_id,
            start: 0,
            count: 10,
        }
    }

    #[test]
    fn test_drain_run_keeps_other_runs() {
        let queue = LocalQueue::new();
        queue.enqueue(job("a", 0)).unwrap();
        queue.enqueue(job("b", 0)).unwrap();
        queue.enqueue(job("a", 1)).unwrap();
        assert_eq!(queue.pending("a"), 2);

        let drained = queue.drain_run("a");
        assert_eq!(drained, vec![job("a", 0), job("a", 1)]);
        assert_eq!(queue.len(), 1);
        assert!(queue.drain_run("a").is_empty());
        assert_eq!(queue.drain_run("b"), vec![job("b", 0)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_job_serializes() {
        let json = serde_json::to_string(&job("run", 3)).unwrap();
        let parsed: BatchJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, job("run", 3));
    }
}

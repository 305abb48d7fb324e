//! Partial-result storage for permutation batches.
//!
//! Records are keyed by run id and batch id. Workers only ever touch their
//! own batch; the orchestrator lists and deletes a whole run.

use super::batch::PermutationBatch;
use crate::error::{CoremicError, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Key-value storage of batch checkpoints.
pub trait BatchStore: Send + Sync {
    /// Insert or replace a batch record.
    fn put(&self, run_id: &str, batch: &PermutationBatch) -> Result<()>;

    fn get(&self, run_id: &str, batch_id: usize) -> Result<Option<PermutationBatch>>;

    /// Every batch of a run, ordered by batch id.
    fn list(&self, run_id: &str) -> Result<Vec<PermutationBatch>>;

    /// Remove every record of a run, including its cancellation flag.
    fn delete_all(&self, run_id: &str) -> Result<()>;

    /// Flag a run as cancelled. Workers stop at their next trial boundary.
    fn cancel(&self, run_id: &str) -> Result<()>;

    fn is_cancelled(&self, run_id: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
struct RunRecords {
    batches: BTreeMap<usize, PermutationBatch>,
    cancelled: bool,
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: Mutex<HashMap<String, RunRecords>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchStore for MemoryStore {
    fn put(&self, run_id: &str, batch: &PermutationBatch) -> Result<()> {
        self.runs
            .lock()
            .entry(run_id.to_string())
            .or_default()
            .batches
            .insert(batch.batch_id, batch.clone());
        Ok(())
    }

    fn get(&self, run_id: &str, batch_id: usize) -> Result<Option<PermutationBatch>> {
        Ok(self
            .runs
            .lock()
            .get(run_id)
            .and_then(|run| run.batches.get(&batch_id).cloned()))
    }

    fn list(&self, run_id: &str) -> Result<Vec<PermutationBatch>> {
        Ok(self
            .runs
            .lock()
            .get(run_id)
            .map(|run| run.batches.values().cloned().collect())
            .unwrap_or_default())
    }

    fn delete_all(&self, run_id: &str) -> Result<()> {
        self.runs.lock().remove(run_id);
        Ok(())
    }

    fn cancel(&self, run_id: &str) -> Result<()> {
        self.runs
            .lock()
            .entry(run_id.to_string())
            .or_default()
            .cancelled = true;
        Ok(())
    }

    fn is_cancelled(&self, run_id: &str) -> Result<bool> {
        Ok(self
            .runs
            .lock()
            .get(run_id)
            .map(|run| run.cancelled)
            .unwrap_or(false))
    }
}

const CANCEL_MARKER: &str = "CANCELLED";

/// One JSON file per batch under `<root>/<run_id>/`.
///
/// Records survive the process, so a run whose process stopped mid-run can
/// be picked up with [`Orchestrator::resume`](super::Orchestrator::resume)
/// from the same directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at `root`. The directory is created on first write.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id.starts_with('.') {
            return Err(CoremicError::Store(format!("invalid run id '{}'", run_id)));
        }
        Ok(self.root.join(run_id))
    }

    fn batch_path(&self, run_id: &str, batch_id: usize) -> Result<PathBuf> {
        Ok(self.run_dir(run_id)?.join(format!("batch-{:05}.json", batch_id)))
    }
}

impl BatchStore for FileStore {
    fn put(&self, run_id: &str, batch: &PermutationBatch) -> Result<()> {
        let dir = self.run_dir(run_id)?;
        fs::create_dir_all(&dir)?;
        let path = self.batch_path(run_id, batch.batch_id)?;
        // Replaced via rename; readers see the old or the new record
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(batch)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, run_id: &str, batch_id: usize) -> Result<Option<PermutationBatch>> {
        match fs::read(self.batch_path(run_id, batch_id)?) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, run_id: &str) -> Result<Vec<PermutationBatch>> {
        let dir = self.run_dir(run_id)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut batches = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let batch: PermutationBatch = serde_json::from_slice(&fs::read(&path)?)?;
            batches.push(batch);
        }
        batches.sort_by_key(|b| b.batch_id);
        Ok(batches)
    }

    fn delete_all(&self, run_id: &str) -> Result<()> {
        match fs::remove_dir_all(self.run_dir(run_id)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn cancel(&self, run_id: &str) -> Result<()> {
        let dir = self.run_dir(run_id)?;
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(CANCEL_MARKER), b"")?;
        Ok(())
    }

    fn is_cancelled(&self, run_id: &str) -> Result<bool> {
        Ok(self.run_dir(run_id)?.join(CANCEL_MARKER).exists())
    }
}

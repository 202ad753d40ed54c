//! Local record stores.
//!
//! A store owns the client's view of every record plus the durable queue of
//! records awaiting submission. Both implementations keep a [`StoreSnapshot`]
//! in memory; [`FileStore`] additionally writes it through to disk on every
//! mutation, so a write is durable by the time the call returns.

use crate::error::StoreError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tether_engine::{PendingQueue, Record, StoreSnapshot};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable key-value persistence for records and the pending queue.
pub trait LocalStore: Send + 'static {
    fn get(&self, id: &str) -> StoreResult<Option<Record>>;

    /// Insert or replace a record by id.
    fn put(&mut self, record: Record) -> StoreResult<()>;

    /// Remove a record, returning it if it was present.
    fn delete(&mut self, id: &str) -> StoreResult<Option<Record>>;

    /// All records, in insertion order.
    fn list(&self) -> StoreResult<Vec<Record>>;

    /// Swap the entry stored under `old_id` for `record`, keeping its
    /// position. Returns `false` if `old_id` is gone.
    fn replace(&mut self, old_id: &str, record: Record) -> StoreResult<bool>;

    fn queue(&self) -> StoreResult<PendingQueue>;

    fn save_queue(&mut self, queue: &PendingQueue) -> StoreResult<()>;
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshot: StoreSnapshot,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing state.
    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.snapshot
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, id: &str) -> StoreResult<Option<Record>> {
        Ok(self.snapshot.get(id).cloned())
    }

    fn put(&mut self, record: Record) -> StoreResult<()> {
        self.snapshot.put(record);
        Ok(())
    }

    fn delete(&mut self, id: &str) -> StoreResult<Option<Record>> {
        Ok(self.snapshot.delete(id))
    }

    fn list(&self) -> StoreResult<Vec<Record>> {
        Ok(self.snapshot.records.clone())
    }

    fn replace(&mut self, old_id: &str, record: Record) -> StoreResult<bool> {
        Ok(self.snapshot.replace(old_id, record))
    }

    fn queue(&self) -> StoreResult<PendingQueue> {
        Ok(self.snapshot.queue.clone())
    }

    fn save_queue(&mut self, queue: &PendingQueue) -> StoreResult<()> {
        self.snapshot.queue = queue.clone();
        Ok(())
    }
}

/// Store persisted as a single JSON document.
///
/// Every mutation rewrites the document through a temporary file followed by
/// a rename, so a crash leaves either the old or the new state on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    snapshot: StoreSnapshot,
}

impl FileStore {
    /// Open the store at `path`, creating an empty one if the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(json) => StoreSnapshot::from_json(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No existing store, starting empty");
                StoreSnapshot::new()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            path = %path.display(),
            records = snapshot.records.len(),
            queued = snapshot.queue.len(),
            "Opened file store"
        );

        Ok(Self { path, snapshot })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.snapshot
    }

    fn persist(&self) -> StoreResult<()> {
        let json = self.snapshot.to_json_pretty()?;
        let tmp = self.path.with_extension("tmp");

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply a mutation and write it through; roll back the in-memory copy
    /// if the write fails so memory never runs ahead of disk.
    fn mutate<T>(&mut self, f: impl FnOnce(&mut StoreSnapshot) -> T) -> StoreResult<T> {
        let before = self.snapshot.clone();
        let out = f(&mut self.snapshot);
        if let Err(e) = self.persist() {
            self.snapshot = before;
            return Err(e);
        }
        Ok(out)
    }
}

impl LocalStore for FileStore {
    fn get(&self, id: &str) -> StoreResult<Option<Record>> {
        Ok(self.snapshot.get(id).cloned())
    }

    fn put(&mut self, record: Record) -> StoreResult<()> {
        self.mutate(|s| s.put(record))
    }

    fn delete(&mut self, id: &str) -> StoreResult<Option<Record>> {
        if self.snapshot.get(id).is_none() {
            return Ok(None);
        }
        self.mutate(|s| s.delete(id))
    }

    fn list(&self) -> StoreResult<Vec<Record>> {
        Ok(self.snapshot.records.clone())
    }

    fn replace(&mut self, old_id: &str, record: Record) -> StoreResult<bool> {
        if self.snapshot.get(old_id).is_none() {
            return Ok(false);
        }
        self.mutate(|s| s.replace(old_id, record))
    }

    fn queue(&self) -> StoreResult<PendingQueue> {
        Ok(self.snapshot.queue.clone())
    }

    fn save_queue(&mut self, queue: &PendingQueue) -> StoreResult<()> {
        self.mutate(|s| s.queue = queue.clone())
    }
}

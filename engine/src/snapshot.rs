//! Snapshot of the local store: records plus the pending queue.
//!
//! Snapshots are the bridge between the in-memory state and persistent
//! storage. Records keep their insertion order so views stay stable, and the
//! JSON form is deterministic for a given state.

use crate::{error::Result, Error, PendingQueue, Record, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time copy of everything the client keeps durably.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Records in insertion order, at most one per id
    pub records: Vec<Record>,
    /// Records awaiting submission, in submission order
    #[serde(default)]
    pub queue: PendingQueue,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreSnapshot {
    /// Create a new empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            records: Vec::new(),
            queue: PendingQueue::new(),
        }
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Insert a record, replacing an existing one with the same id in place.
    pub fn put(&mut self, record: Record) {
        match self.records.iter_mut().find(|r| r.id() == record.id()) {
            Some(slot) => *slot = record,
            None => self.records.push(record),
        }
    }

    /// Remove a record by id.
    pub fn delete(&mut self, id: &str) -> Option<Record> {
        let pos = self.records.iter().position(|r| r.id() == id)?;
        Some(self.records.remove(pos))
    }

    /// Replace the record stored under `old_id` with `record`, keeping its
    /// position. Any other entry already using the new id is dropped so the
    /// one-entry-per-id invariant holds.
    ///
    /// Returns `false` (and changes nothing) if `old_id` is not present.
    pub fn replace(&mut self, old_id: &str, record: Record) -> bool {
        let Some(pos) = self.records.iter().position(|r| r.id() == old_id) else {
            return false;
        };
        let new_id = record.id().clone();
        self.records[pos] = record;

        let mut index = 0;
        self.records.retain(|r| {
            let keep = index == pos || r.id() != &new_id;
            index += 1;
            keep
        });
        true
    }

    /// Count of records still pending.
    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_pending()).count()
    }

    /// Pending records that have no queue item.
    pub fn orphaned(&self) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .filter(|r| r.is_pending() && !self.queue.contains(r.id()))
    }

    /// Check structural invariants: unique record ids, unique queue ids.
    pub fn validate(&self) -> Result<()> {
        let mut ids: HashSet<&RecordId> = HashSet::with_capacity(self.records.len());
        for record in &self.records {
            if !ids.insert(record.id()) {
                return Err(Error::DuplicateRecord(record.id().clone()));
            }
        }

        let mut queued: HashSet<&RecordId> = HashSet::with_capacity(self.queue.len());
        for item in self.queue.iter() {
            if !queued.insert(&item.id) {
                return Err(Error::DuplicateQueueItem(item.id.clone()));
            }
        }

        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Summary of a snapshot (without the full data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub format_version: u32,
    pub record_count: usize,
    pub pending_count: usize,
    pub queued_count: usize,
    pub parked_count: usize,
}

impl From<&StoreSnapshot> for SnapshotMetadata {
    fn from(snapshot: &StoreSnapshot) -> Self {
        Self {
            format_version: snapshot.format_version,
            record_count: snapshot.records.len(),
            pending_count: snapshot.pending_count(),
            queued_count: snapshot.queue.len(),
            parked_count: snapshot.queue.parked().count(),
        }
    }
}

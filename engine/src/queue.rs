//! Durable queue of records awaiting remote submission.
//!
//! The queue is an ordered list of [`QueueItem`]s. Items are attempted in
//! stored order; an item that exhausted its retry budget stays in the queue
//! as "parked" until the user retries or deletes it.

use crate::{Payload, Record, RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// A record waiting to be submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Local id of the pending record
    pub id: RecordId,
    /// Payload to submit
    pub payload: Payload,
    /// Number of failed submissions so far
    pub attempts: u32,
    /// When the item was queued (milliseconds since epoch)
    pub created_at: Timestamp,
    /// No further automatic attempts will be made
    #[serde(default)]
    pub parked: bool,
    /// Message of the most recent failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Create a fresh item with no attempts.
    pub fn new(id: impl Into<RecordId>, payload: Payload, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            payload,
            attempts: 0,
            created_at,
            parked: false,
            last_error: None,
        }
    }

    /// Record a failed submission.
    ///
    /// Parks the item once `attempts` reaches `max_attempts`. Returns whether
    /// the item is parked afterwards.
    pub fn record_failure(&mut self, error: impl Into<String>, max_attempts: u32) -> bool {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
        if self.attempts >= max_attempts {
            self.parked = true;
        }
        self.parked
    }

    /// Park the item regardless of the attempt count.
    pub fn park(&mut self, error: impl Into<String>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
        self.parked = true;
    }
}

/// Ordered collection of queue items, at most one per id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingQueue {
    items: Vec<QueueItem>,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append an item unless one with the same id exists.
    ///
    /// Returns `true` if the item was added.
    pub fn push(&mut self, item: QueueItem) -> bool {
        if self.contains(&item.id) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Remove an item, returning it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<QueueItem> {
        let pos = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(pos))
    }

    /// First item in stored order that is not parked and passes `filter`.
    pub fn next_ready(&self, mut filter: impl FnMut(&QueueItem) -> bool) -> Option<&QueueItem> {
        self.items
            .iter()
            .find(|item| !item.parked && filter(item))
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    /// Items that will not be retried automatically.
    pub fn parked(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter().filter(|item| item.parked)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<QueueItem> for PendingQueue {
    fn from_iter<I: IntoIterator<Item = QueueItem>>(iter: I) -> Self {
        let mut queue = PendingQueue::new();
        for item in iter {
            queue.push(item);
        }
        queue
    }
}

/// Sync state of a record as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SyncStatus {
    /// Confirmed by the remote authority
    Synced,
    /// Pending and still being retried automatically
    #[serde(rename_all = "camelCase")]
    Syncing { attempts: u32 },
    /// Pending, retries exhausted; needs a manual retry
    #[serde(rename_all = "camelCase")]
    NeedsRetry {
        attempts: u32,
        last_error: Option<String>,
    },
}

impl SyncStatus {
    /// Derive the status of a record from its queue item, if any.
    ///
    /// A pending record without a queue item is reported as syncing with no
    /// attempts: it is either mid fast-path or awaiting recovery.
    pub fn of(record: &Record, item: Option<&QueueItem>) -> Self {
        if !record.is_pending() {
            return SyncStatus::Synced;
        }
        match item {
            Some(item) if item.parked => SyncStatus::NeedsRetry {
                attempts: item.attempts,
                last_error: item.last_error.clone(),
            },
            Some(item) => SyncStatus::Syncing {
                attempts: item.attempts,
            },
            None => SyncStatus::Syncing { attempts: 0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str) -> QueueItem {
        QueueItem::new(id, json!({"id": id}), 1000)
    }

    #[test]
    fn push_is_idempotent() {
        let mut queue = PendingQueue::new();
        assert!(queue.push(item("a")));
        assert!(!queue.push(item("a")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_keeps_order() {
        let mut queue: PendingQueue = ["a", "b", "c"].into_iter().map(item).collect();
        assert!(queue.remove("b").is_some());
        assert!(queue.remove("b").is_none());

        let ids: Vec<_> = queue.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn failure_parks_at_cap() {
        let mut it = item("a");
        assert!(!it.record_failure("timeout", 3));
        assert!(!it.record_failure("timeout", 3));
        assert!(it.record_failure("timeout", 3));
        assert_eq!(it.attempts, 3);
        assert_eq!(it.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn next_ready_skips_parked() {
        let mut queue: PendingQueue = ["a", "b"].into_iter().map(item).collect();
        queue.get_mut("a").unwrap().park("rejected");

        let next = queue.next_ready(|_| true).unwrap();
        assert_eq!(next.id, "b");
        assert!(queue.next_ready(|i| i.id != "b").is_none());
        assert_eq!(queue.parked().count(), 1);
    }

    #[test]
    fn status_derivation() {
        let pending = Record::local("a", json!({}), 1);
        let canonical = Record::canonical("srv", json!({}));
        let mut it = item("a");

        assert_eq!(SyncStatus::of(&canonical, None), SyncStatus::Synced);
        assert_eq!(
            SyncStatus::of(&pending, Some(&it)),
            SyncStatus::Syncing { attempts: 0 }
        );

        it.park("bad request");
        assert_eq!(
            SyncStatus::of(&pending, Some(&it)),
            SyncStatus::NeedsRetry {
                attempts: 1,
                last_error: Some("bad request".into())
            }
        );
    }

    #[test]
    fn legacy_item_without_parked_field() {
        let raw = json!({"id": "a", "payload": {}, "attempts": 2, "createdAt": 5});
        let parsed: QueueItem = serde_json::from_value(raw).unwrap();
        assert!(!parsed.parked);
        assert!(parsed.last_error.is_none());
        assert_eq!(parsed.attempts, 2);
    }
}

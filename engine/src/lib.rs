//! # Tether Engine
//!
//! The deterministic core of a local-first synchronization engine.
//!
//! A client creates records while possibly offline. Each record is usable
//! immediately from a local store, queued durably for submission to a single
//! remote authority, retried with capped exponential backoff, and reconciled
//! against the authoritative listing once the client is back online.
//!
//! This crate holds the parts of that system that do no IO: the data model,
//! the queue bookkeeping, the backoff schedule, the merge rules and the
//! promotion notifier. The async runtime that drives them lives in
//! `tether-client`.
//!
//! ## Design Principles
//!
//! - **No IO**: no files, sockets, timers or async
//! - **Deterministic**: merging the same inputs always yields the same view;
//!   backoff jitter comes from a caller-supplied RNG
//! - **Explicit states**: a record is either [`Record::LocalOnly`] or
//!   [`Record::Canonical`], and moves between them through [`Record::promote`]
//!
//! ## Core Concepts
//!
//! ### Records and promotion
//!
//! A pending record carries a locally generated id. When the remote accepts
//! it, the returned [`CanonicalRecord`] may carry a different id; the store
//! replaces the local entry in place instead of adding a second one.
//!
//! ### Queue
//!
//! A [`PendingQueue`] holds one [`QueueItem`] per pending record. Failed
//! submissions bump `attempts`; at the cap the item is parked and only a
//! manual retry or deletion touches it again.
//!
//! ### Merge
//!
//! [`merge`] combines a remote listing with local records. Remote entries win
//! on equal ids; an absent or empty remote listing never hides local records.
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_engine::{merge, CanonicalRecord, Record, StoreSnapshot, QueueItem};
//! use serde_json::json;
//!
//! // 1. Optimistically store a record and queue it
//! let mut snapshot = StoreSnapshot::new();
//! snapshot.put(Record::local("local-1", json!({"title": "Draft"}), 1706745600000));
//! snapshot.queue.push(QueueItem::new("local-1", json!({"title": "Draft"}), 1706745600000));
//!
//! // 2. The remote accepts it under a new id
//! let canonical = CanonicalRecord::new("srv-42", json!({"title": "Draft"}));
//! snapshot.replace("local-1", canonical.clone().into());
//! snapshot.queue.remove("local-1");
//!
//! // 3. Merge with a remote listing
//! let view = merge(Some(&[Record::from(canonical)][..]), &snapshot.records, 50);
//! assert_eq!(view.ids(), vec!["srv-42"]);
//! ```
//!
//! ## Persistence
//!
//! [`StoreSnapshot`] is the durable form of the local store: records in
//! insertion order plus the pending queue, serialized to JSON with a format
//! version.

pub mod backoff;
pub mod config;
pub mod error;
pub mod merge;
pub mod notify;
pub mod queue;
pub mod record;
pub mod snapshot;

// Re-export main types at crate root
pub use backoff::Backoff;
pub use config::{RetryPolicy, SyncConfig};
pub use error::Error;
pub use merge::{merge, MergedView, ViewSource};
pub use notify::{Notifier, PublishReport, Subscription};
pub use queue::{PendingQueue, QueueItem, SyncStatus};
pub use record::{CanonicalRecord, Keyed, LocalRecord, Promotion, Record};
pub use snapshot::{SnapshotMetadata, StoreSnapshot, SNAPSHOT_FORMAT_VERSION};

/// Type aliases for clarity
pub type RecordId = String;
pub type Payload = serde_json::Value;
pub type Timestamp = u64;

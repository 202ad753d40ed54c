//! Record types tracked by the sync engine.
//!
//! A record is either an optimistic local copy that has not been confirmed by
//! the remote authority yet, or the canonical copy the authority returned.
//! The two states are distinct variants; moving from one to the other goes
//! through [`Record::promote`] rather than flipping a flag in place.

use crate::{error::Result, Error, Payload, RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// Anything that can be deduplicated by a string identity.
pub trait Keyed {
    /// The identity used for deduplication.
    fn key(&self) -> &str;
}

/// An optimistic record that only exists on this client so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    /// Locally generated identifier, also used as the idempotency key
    pub id: RecordId,
    /// Opaque payload
    pub payload: Payload,
    /// When the record was created locally (milliseconds since epoch)
    pub created_at: Timestamp,
}

impl LocalRecord {
    /// Create a new local record.
    pub fn new(id: impl Into<RecordId>, payload: Payload, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            payload,
            created_at,
        }
    }
}

/// The authoritative shape of a record as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    /// Server-assigned identifier, may differ from the local one
    pub id: RecordId,
    /// Payload as stored by the server
    pub payload: Payload,
}

impl CanonicalRecord {
    /// Create a new canonical record.
    pub fn new(id: impl Into<RecordId>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// A record held by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Record {
    /// Created locally, not yet confirmed
    LocalOnly(LocalRecord),
    /// Confirmed by the remote authority
    Canonical(CanonicalRecord),
}

impl Record {
    /// Create a pending local record.
    pub fn local(id: impl Into<RecordId>, payload: Payload, created_at: Timestamp) -> Self {
        Record::LocalOnly(LocalRecord::new(id, payload, created_at))
    }

    /// Create a canonical record.
    pub fn canonical(id: impl Into<RecordId>, payload: Payload) -> Self {
        Record::Canonical(CanonicalRecord::new(id, payload))
    }

    pub fn id(&self) -> &RecordId {
        match self {
            Record::LocalOnly(r) => &r.id,
            Record::Canonical(r) => &r.id,
        }
    }

    pub fn payload(&self) -> &Payload {
        match self {
            Record::LocalOnly(r) => &r.payload,
            Record::Canonical(r) => &r.payload,
        }
    }

    /// Whether this record is still waiting for remote confirmation.
    pub fn is_pending(&self) -> bool {
        matches!(self, Record::LocalOnly(_))
    }

    /// Promote a pending record to its canonical counterpart.
    ///
    /// Returns the local id that was replaced along with the new record, so
    /// callers can swap the entry in place. Promoting a record that is
    /// already canonical is an error.
    pub fn promote(self, canonical: CanonicalRecord) -> Result<Promotion> {
        match self {
            Record::LocalOnly(local) => Ok(Promotion {
                local_id: local.id,
                record: canonical,
            }),
            Record::Canonical(existing) => Err(Error::AlreadyCanonical(existing.id)),
        }
    }
}

impl From<CanonicalRecord> for Record {
    fn from(record: CanonicalRecord) -> Self {
        Record::Canonical(record)
    }
}

impl From<LocalRecord> for Record {
    fn from(record: LocalRecord) -> Self {
        Record::LocalOnly(record)
    }
}

impl Keyed for Record {
    fn key(&self) -> &str {
        self.id()
    }
}

impl Keyed for CanonicalRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for LocalRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// The result of promoting a local record: "local X became canonical Y".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    /// Id the record had while it was pending
    pub local_id: RecordId,
    /// The canonical record that replaces it
    pub record: CanonicalRecord,
}

impl Promotion {
    /// Whether the server kept the locally generated id.
    pub fn id_changed(&self) -> bool {
        self.local_id != self.record.id
    }
}

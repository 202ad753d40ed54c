//! The remote submission primitive.
//!
//! The sync queue only needs two things from the authority: create a record
//! and list records. Anything that can do both (an HTTP API, a test double)
//! implements [`Remote`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_engine::{CanonicalRecord, Payload, RecordId};

/// A single submission of a pending record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Local id of the record; doubles as the idempotency key, so a
    /// resubmission after a crash is recognised by the authority.
    pub local_id: RecordId,
    pub payload: Payload,
}

impl Submission {
    pub fn new(local_id: impl Into<RecordId>, payload: Payload) -> Self {
        Self {
            local_id: local_id.into(),
            payload,
        }
    }

    pub fn idempotency_key(&self) -> &str {
        &self.local_id
    }
}

/// Why a submission failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Network trouble, timeouts, overload. Likely to succeed later.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The authority refused the record. Retrying will not help.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl SubmitError {
    pub fn transient(msg: impl Into<String>) -> Self {
        SubmitError::Transient(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        SubmitError::Rejected(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Transient(_))
    }
}

/// The authoritative store.
#[async_trait]
pub trait Remote: Send + Sync + 'static {
    /// Create a record, returning its canonical form.
    async fn submit(&self, submission: &Submission) -> Result<CanonicalRecord, SubmitError>;

    /// List the canonical records, newest first, at most `limit` of them.
    async fn list(&self, limit: usize) -> Result<Vec<CanonicalRecord>, SubmitError>;
}

#[async_trait]
impl<R: Remote + ?Sized> Remote for std::sync::Arc<R> {
    async fn submit(&self, submission: &Submission) -> Result<CanonicalRecord, SubmitError> {
        (**self).submit(submission).await
    }

    async fn list(&self, limit: usize) -> Result<Vec<CanonicalRecord>, SubmitError> {
        (**self).list(limit).await
    }
}

//! Record handlers - create and list canonical records.

use crate::db::{Inserted, RecordRepository, StoredRecord};
use crate::error::{AppError, Result};
use serde::Deserialize;
use tether_engine::{CanonicalRecord, Payload, RecordId};

/// Request body for record creation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    /// Client-side id; used as the idempotency key when no header is sent
    pub local_id: Option<RecordId>,
    pub payload: Payload,
}

/// Query parameters for listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Maximum number of records to return
    pub limit: Option<usize>,
}

/// Default limit for listing.
pub const DEFAULT_LIMIT: usize = 100;

/// Maximum limit for listing.
pub const MAX_LIMIT: usize = 1000;

/// Create a record, replaying the original for a known idempotency key.
pub async fn handle_create(
    repo: &RecordRepository,
    idempotency_key: Option<&str>,
    request: CreateRecordRequest,
) -> Result<Inserted> {
    if !request.payload.is_object() {
        return Err(AppError::Unprocessable(
            "payload must be a JSON object".to_string(),
        ));
    }

    let key = idempotency_key.or(request.local_id.as_deref());
    if key == Some("") {
        return Err(AppError::BadRequest("empty idempotency key".to_string()));
    }

    let inserted = repo.insert(key, request.payload).await;
    match &inserted {
        Inserted::Created(record) => {
            tracing::info!(record_id = %record.id, idempotency_key = ?key, "Created record");
        }
        Inserted::Replayed(record) => {
            tracing::debug!(record_id = %record.id, idempotency_key = ?key, "Replayed record");
        }
    }
    Ok(inserted)
}

/// List records, newest first.
pub async fn handle_list(repo: &RecordRepository, query: ListQuery) -> Vec<CanonicalRecord> {
    let limit = query
        .limit
        .map(|l| l.clamp(1, MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT);
    repo.list(limit).await
}

/// Fetch one record.
pub async fn handle_get(repo: &RecordRepository, id: &str) -> Result<StoredRecord> {
    repo.get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("record {id}")))
}

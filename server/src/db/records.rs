//! In-memory record table.

use std::collections::HashMap;
use tether_engine::{CanonicalRecord, Payload, RecordId};
use tokio::sync::RwLock;

/// A stored record row.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record: CanonicalRecord,
    /// Key the record was created under, if the client sent one
    pub idempotency_key: Option<String>,
    /// Server receive time, milliseconds since the Unix epoch
    pub created_at: i64,
}

/// Outcome of [`RecordRepository::insert`].
#[derive(Debug, Clone, PartialEq)]
pub enum Inserted {
    /// A new record was created
    Created(CanonicalRecord),
    /// The idempotency key was seen before; this is the original record
    Replayed(CanonicalRecord),
}

impl Inserted {
    pub fn record(&self) -> &CanonicalRecord {
        match self {
            Inserted::Created(record) | Inserted::Replayed(record) => record,
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    /// Rows in creation order
    rows: Vec<StoredRecord>,
    by_id: HashMap<RecordId, usize>,
    by_key: HashMap<String, usize>,
}

/// The authority's record table.
#[derive(Debug, Default)]
pub struct RecordRepository {
    table: RwLock<Table>,
}

impl RecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record with a fresh id, or return the one already created
    /// under `idempotency_key`.
    pub async fn insert(&self, idempotency_key: Option<&str>, payload: Payload) -> Inserted {
        let mut table = self.table.write().await;

        if let Some(key) = idempotency_key {
            if let Some(&index) = table.by_key.get(key) {
                return Inserted::Replayed(table.rows[index].record.clone());
            }
        }

        let record = CanonicalRecord::new(uuid::Uuid::new_v4().to_string(), payload);
        let index = table.rows.len();
        table.by_id.insert(record.id.clone(), index);
        if let Some(key) = idempotency_key {
            table.by_key.insert(key.to_string(), index);
        }
        table.rows.push(StoredRecord {
            record: record.clone(),
            idempotency_key: idempotency_key.map(str::to_string),
            created_at: chrono::Utc::now().timestamp_millis(),
        });

        Inserted::Created(record)
    }

    /// Get a record by id.
    pub async fn get(&self, id: &str) -> Option<StoredRecord> {
        let table = self.table.read().await;
        table.by_id.get(id).map(|&index| table.rows[index].clone())
    }

    /// Newest records first, at most `limit`.
    pub async fn list(&self, limit: usize) -> Vec<CanonicalRecord> {
        let table = self.table.read().await;
        table
            .rows
            .iter()
            .rev()
            .take(limit)
            .map(|row| row.record.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.table.read().await.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_ids() {
        let repo = RecordRepository::new();
        let a = repo.insert(None, json!({"n": 1})).await;
        let b = repo.insert(None, json!({"n": 2})).await;

        assert!(matches!(a, Inserted::Created(_)));
        assert_ne!(a.record().id, b.record().id);
        assert_eq!(repo.count().await, 2);
    }

    #[tokio::test]
    async fn idempotency_key_replays() {
        let repo = RecordRepository::new();
        let first = repo.insert(Some("local-1"), json!({"n": 1})).await;
        let second = repo.insert(Some("local-1"), json!({"n": 999})).await;

        assert!(matches!(second, Inserted::Replayed(_)));
        assert_eq!(first.record(), second.record());
        assert_eq!(second.record().payload, json!({"n": 1}));
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let repo = RecordRepository::new();
        for n in 0..5 {
            repo.insert(None, json!({ "n": n })).await;
        }

        let listed = repo.list(3).await;
        let ns: Vec<_> = listed.iter().map(|r| r.payload["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn get_by_id() {
        let repo = RecordRepository::new();
        let created = repo.insert(Some("k"), json!({})).await;

        let stored = repo.get(&created.record().id).await.unwrap();
        assert_eq!(stored.idempotency_key.as_deref(), Some("k"));
        assert!(stored.created_at > 0);
        assert!(repo.get("missing").await.is_none());
    }
}

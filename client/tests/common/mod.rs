//! Shared test doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_client::{
    LocalStore, MemoryStore, Remote, StoreError, StoreResult, Submission, SubmitError,
};
use tether_engine::{
    CanonicalRecord, LocalRecord, PendingQueue, QueueItem, Record, StoreSnapshot,
};

/// A remote whose submission outcomes are scripted in advance.
///
/// Each submission pops the next scripted outcome; once the script runs out
/// the fallback applies. Accepted submissions are deduplicated by
/// idempotency key, like the real authority.
#[derive(Default)]
pub struct ScriptedRemote {
    script: Mutex<VecDeque<Option<SubmitError>>>,
    fallback: Mutex<Option<SubmitError>>,
    accepted: Mutex<Vec<CanonicalRecord>>,
    by_key: Mutex<HashMap<String, CanonicalRecord>>,
    submitted_keys: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
    offline_listing: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedRemote {
    /// Accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every submission with a transient error.
    pub fn failing() -> Self {
        let remote = Self::default();
        remote.fail_by_default(SubmitError::transient("connection refused"));
        remote
    }

    /// Fail the next `n` submissions transiently, then accept.
    pub fn failing_times(n: usize) -> Self {
        let remote = Self::default();
        for _ in 0..n {
            remote.push_failure(SubmitError::transient("503 Service Unavailable"));
        }
        remote
    }

    pub fn push_failure(&self, error: SubmitError) {
        self.script.lock().unwrap().push_back(Some(error));
    }

    pub fn push_success(&self) {
        self.script.lock().unwrap().push_back(None);
    }

    pub fn fail_by_default(&self, error: SubmitError) {
        *self.fallback.lock().unwrap() = Some(error);
    }

    pub fn succeed_by_default(&self) {
        *self.fallback.lock().unwrap() = None;
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = latency;
        self
    }

    pub fn set_listing_offline(&self, offline: bool) {
        self.offline_listing.store(offline, Ordering::SeqCst);
    }

    /// Total number of submissions received, including failed ones.
    pub fn submissions(&self) -> usize {
        self.submitted_keys.lock().unwrap().len()
    }

    pub fn submitted_keys(&self) -> Vec<String> {
        self.submitted_keys.lock().unwrap().clone()
    }

    pub fn accepted(&self) -> Vec<CanonicalRecord> {
        self.accepted.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Remote for ScriptedRemote {
    async fn submit(&self, submission: &Submission) -> Result<CanonicalRecord, SubmitError> {
        self.submitted_keys
            .lock()
            .unwrap()
            .push(submission.idempotency_key().to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => self.fallback.lock().unwrap().clone(),
        };
        if let Some(error) = outcome {
            return Err(error);
        }

        let mut by_key = self.by_key.lock().unwrap();
        if let Some(existing) = by_key.get(submission.idempotency_key()) {
            return Ok(existing.clone());
        }

        let mut accepted = self.accepted.lock().unwrap();
        let record = CanonicalRecord::new(
            format!("srv-{}", accepted.len() + 1),
            submission.payload.clone(),
        );
        accepted.push(record.clone());
        by_key.insert(submission.idempotency_key().to_string(), record.clone());
        Ok(record)
    }

    async fn list(&self, limit: usize) -> Result<Vec<CanonicalRecord>, SubmitError> {
        if self.offline_listing.load(Ordering::SeqCst) {
            return Err(SubmitError::transient("offline"));
        }
        let accepted = self.accepted.lock().unwrap();
        Ok(accepted.iter().rev().take(limit).cloned().collect())
    }
}

/// A snapshot holding `ids` as pending records, each with a queue item.
pub fn pending_snapshot(ids: &[&str]) -> StoreSnapshot {
    let mut snapshot = StoreSnapshot::new();
    for (n, id) in ids.iter().enumerate() {
        let payload = json!({ "title": format!("item {n}") });
        snapshot.put(Record::LocalOnly(LocalRecord::new(*id, payload.clone(), 1_000 + n as u64)));
        snapshot.queue.push(QueueItem::new(*id, payload, 1_000 + n as u64));
    }
    snapshot
}

/// A memory store whose writes can be switched to fail like a full disk.
pub struct FailingStore {
    inner: MemoryStore,
    failing: Arc<AtomicBool>,
}

impl FailingStore {
    /// The store plus the switch that makes its writes fail.
    pub fn new(snapshot: StoreSnapshot) -> (Self, Arc<AtomicBool>) {
        let failing = Arc::new(AtomicBool::new(false));
        let store = Self {
            inner: MemoryStore::with_snapshot(snapshot),
            failing: failing.clone(),
        };
        (store, failing)
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        Ok(())
    }
}

impl LocalStore for FailingStore {
    fn get(&self, id: &str) -> StoreResult<Option<Record>> {
        self.inner.get(id)
    }

    fn put(&mut self, record: Record) -> StoreResult<()> {
        self.check()?;
        self.inner.put(record)
    }

    fn delete(&mut self, id: &str) -> StoreResult<Option<Record>> {
        self.check()?;
        self.inner.delete(id)
    }

    fn list(&self) -> StoreResult<Vec<Record>> {
        self.inner.list()
    }

    fn replace(&mut self, old_id: &str, record: Record) -> StoreResult<bool> {
        self.check()?;
        self.inner.replace(old_id, record)
    }

    fn queue(&self) -> StoreResult<PendingQueue> {
        self.inner.queue()
    }

    fn save_queue(&mut self, queue: &PendingQueue) -> StoreResult<()> {
        self.check()?;
        self.inner.save_queue(queue)
    }
}

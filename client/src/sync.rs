//! The sync queue: drives pending records to the remote authority.
//!
//! # Flow
//!
//! 1. [`SyncQueue::enqueue`] writes the record to the local store as pending
//!    and tries to submit it right away. If that works nothing is queued.
//! 2. On failure the record becomes a [`QueueItem`] and a drain is started
//!    in the background.
//! 3. [`SyncQueue::process`] drains the queue in stored order. Successes are
//!    promoted in the store and announced; the first failure schedules a
//!    backed-off retry and ends the cycle. Until that retry is due, drains
//!    started by new enqueues stop at the backed-off item without submitting.
//!    Items that hit the attempt cap are parked and skipped until
//!    [`SyncQueue::retry`] or [`SyncQueue::delete`].
//!
//! Only one drain runs at a time. The store sits behind an async mutex that
//! is never held across a remote call; an in-flight set keeps the fast path,
//! manual retries and the drain from submitting the same id concurrently.

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::remote::{Remote, Submission, SubmitError};
use crate::store::LocalStore;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_engine::{
    merge, CanonicalRecord, LocalRecord, MergedView, Notifier, Payload, PendingQueue, Promotion,
    QueueItem, Record, RecordId, RetryPolicy, Subscription, SyncConfig, SyncStatus,
};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

/// Capacity of the promotion broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// What happened to an enqueued record.
#[derive(Debug, Clone, PartialEq)]
pub enum Enqueued {
    /// Accepted on the first try; nothing was queued
    Submitted(Promotion),
    /// Submission failed; the record is queued for retry
    Queued,
    /// Submission was refused and the retry policy parked it immediately
    Parked,
    /// The id is already queued or being submitted
    AlreadyQueued,
    /// The id already belongs to a canonical record
    AlreadySynced,
    /// The record was deleted while its submission was in flight
    Deleted,
}

/// Result of a manual retry.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Submitted(Promotion),
    Failed(SubmitError),
    /// A submission for this id is already running
    InFlight,
}

/// Summary of one [`SyncQueue::process`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Another drain was active; this call did nothing
    pub skipped: bool,
    /// Records promoted during this drain, in order
    pub submitted: Vec<Promotion>,
    /// Records that reached the retry cap during this drain
    pub parked: Vec<RecordId>,
    /// Delay of the retry scheduled by the failure that ended the drain
    pub retry_in: Option<Duration>,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Result of [`SyncQueue::recover`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Recovery {
    /// Pending records that had lost their queue item
    pub requeued: usize,
    /// Queue items whose pending record no longer exists
    pub pruned: usize,
}

struct State<S> {
    store: S,
    in_flight: HashSet<RecordId>,
    /// Earliest time a failed item may be submitted again by a drain.
    /// Not persisted: after a restart every item is due.
    not_before: HashMap<RecordId, Instant>,
}

struct Inner<S, R> {
    state: Mutex<State<S>>,
    remote: R,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    events: broadcast::Sender<Promotion>,
    draining: AtomicBool,
    rerun: AtomicBool,
    retry_generation: AtomicU64,
    closed: AtomicBool,
    _forward: Subscription,
}

/// Handle to a sync queue. Cloning is cheap and shares the same queue.
pub struct SyncQueue<S, R> {
    inner: Arc<Inner<S, R>>,
}

impl<S, R> Clone for SyncQueue<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: LocalStore, R: Remote> SyncQueue<S, R> {
    /// Create a queue over `store`, submitting through `remote`.
    pub fn new(store: S, remote: R, config: SyncConfig) -> Result<Self> {
        Self::with_clock(store, remote, config, Arc::new(SystemClock))
    }

    /// Create a queue with an explicit clock for `createdAt` stamps.
    pub fn with_clock(
        store: S,
        remote: R,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let notifier = Notifier::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let forward = {
            let events = events.clone();
            notifier.subscribe(move |record: &CanonicalRecord, local_id: &str| {
                // No receivers is fine.
                let _ = events.send(Promotion {
                    local_id: local_id.to_string(),
                    record: record.clone(),
                });
            })
        };

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    store,
                    in_flight: HashSet::new(),
                    not_before: HashMap::new(),
                }),
                remote,
                config,
                clock,
                notifier,
                events,
                draining: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                retry_generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                _forward: forward,
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// The promotion notifier. Subscribers run synchronously on the drain.
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    /// Register a `(canonical record, original local id)` callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CanonicalRecord, &str) + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(callback)
    }

    /// Receive promotions as a stream.
    pub fn watch(&self) -> broadcast::Receiver<Promotion> {
        self.inner.events.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    /// Create a new pending record with a fresh local id and enqueue it.
    pub async fn create(&self, payload: Payload) -> Result<(LocalRecord, Enqueued)> {
        let record = LocalRecord::new(
            uuid::Uuid::new_v4().to_string(),
            payload,
            self.inner.clock.now_ms(),
        );
        let outcome = self.enqueue(record.clone()).await?;
        Ok((record, outcome))
    }

    /// Store `record` as pending and try to submit it immediately.
    ///
    /// Submission errors are never returned; they turn into a queue entry.
    /// Only store failures surface as `Err`.
    pub async fn enqueue(&self, record: LocalRecord) -> Result<Enqueued> {
        let submission = {
            let mut state = self.inner.state.lock().await;
            if state.in_flight.contains(&record.id) || state.store.queue()?.contains(&record.id) {
                tracing::debug!(record_id = %record.id, "Record already queued");
                return Ok(Enqueued::AlreadyQueued);
            }
            if let Some(Record::Canonical(_)) = state.store.get(&record.id)? {
                tracing::debug!(record_id = %record.id, "Record already synced");
                return Ok(Enqueued::AlreadySynced);
            }

            state.store.put(Record::LocalOnly(record.clone()))?;
            state.in_flight.insert(record.id.clone());
            Submission::new(record.id.clone(), record.payload.clone())
        };

        let result = self.inner.remote.submit(&submission).await;

        let mut state = self.inner.state.lock().await;
        state.in_flight.remove(&record.id);

        let error = match result {
            Ok(canonical) => {
                let promotion = promote(&mut state.store, &record.id, canonical)?;
                drop(state);
                self.announce(&promotion);
                return Ok(Enqueued::Submitted(promotion));
            }
            Err(error) => error,
        };

        if state.store.get(&record.id)?.is_none() {
            tracing::debug!(record_id = %record.id, "Record deleted during submission");
            return Ok(Enqueued::Deleted);
        }

        let mut item = QueueItem::new(record.id.clone(), record.payload, self.inner.clock.now_ms());
        let parked = self.inner.config.retry_policy == RetryPolicy::Classified
            && !error.is_retryable();
        if parked {
            item.park(error.to_string());
        } else {
            item.last_error = Some(error.to_string());
        }

        let mut queue = state.store.queue()?;
        queue.push(item);
        state.store.save_queue(&queue)?;
        drop(state);

        if parked {
            tracing::warn!(
                record_id = %record.id,
                error = %error,
                "Submission rejected, record parked"
            );
            return Ok(Enqueued::Parked);
        }

        tracing::info!(record_id = %record.id, error = %error, "Submission failed, record queued");
        self.kick();
        Ok(Enqueued::Queued)
    }

    /// Drain the queue once.
    ///
    /// Returns immediately with [`DrainReport::skipped`] set if a drain is
    /// already running; that drain picks up anything queued meanwhile.
    pub async fn process(&self) -> Result<DrainReport> {
        let Some(guard) = DrainGuard::acquire(&self.inner.draining) else {
            self.inner.rerun.store(true, Ordering::SeqCst);
            tracing::debug!("Drain already in progress");
            return Ok(DrainReport::skipped());
        };

        let mut report = DrainReport::default();
        loop {
            self.inner.rerun.store(false, Ordering::SeqCst);
            self.drain_cycle(&mut report).await?;
            if report.retry_in.is_some() || !self.inner.rerun.load(Ordering::SeqCst) {
                break;
            }
        }
        drop(guard);

        // A call may have been turned away between the last check and the release.
        if report.retry_in.is_none() && self.inner.rerun.swap(false, Ordering::SeqCst) {
            self.kick();
        }

        tracing::debug!(
            submitted = report.submitted.len(),
            parked = report.parked.len(),
            retry_in_ms = report.retry_in.map(|d| d.as_millis() as u64),
            "Drain finished"
        );
        Ok(report)
    }

    async fn drain_cycle(&self, report: &mut DrainReport) -> Result<()> {
        let mut attempted: HashSet<RecordId> = HashSet::new();

        loop {
            let submission = {
                let mut state = self.inner.state.lock().await;
                let mut queue = state.store.queue()?;

                let next = queue
                    .next_ready(|item| {
                        !attempted.contains(&item.id) && !state.in_flight.contains(&item.id)
                    })
                    .map(|item| Submission::new(item.id.clone(), item.payload.clone()));
                let Some(submission) = next else {
                    return Ok(());
                };

                if state.store.get(&submission.local_id)?.is_none() {
                    tracing::debug!(
                        record_id = %submission.local_id,
                        "Dropping queue item of deleted record"
                    );
                    queue.remove(&submission.local_id);
                    state.store.save_queue(&queue)?;
                    state.not_before.remove(&submission.local_id);
                    continue;
                }

                let due = state.not_before.get(&submission.local_id).copied();
                if let Some(due) = due {
                    let now = Instant::now();
                    if due > now {
                        drop(state);
                        tracing::debug!(
                            record_id = %submission.local_id,
                            "Head of queue is backing off"
                        );
                        self.schedule_retry(due);
                        report.retry_in = Some(due - now);
                        return Ok(());
                    }
                }

                attempted.insert(submission.local_id.clone());
                state.in_flight.insert(submission.local_id.clone());
                submission
            };

            let result = self.inner.remote.submit(&submission).await;

            let mut state = self.inner.state.lock().await;
            state.in_flight.remove(&submission.local_id);

            let error = match result {
                Ok(canonical) => {
                    let promotion = promote(&mut state.store, &submission.local_id, canonical)?;
                    state.not_before.remove(&submission.local_id);
                    drop(state);
                    self.announce(&promotion);
                    report.submitted.push(promotion);
                    continue;
                }
                Err(error) => error,
            };

            let mut queue = state.store.queue()?;
            let Some(item) = queue.get_mut(&submission.local_id) else {
                tracing::debug!(
                    record_id = %submission.local_id,
                    "Record deleted during submission"
                );
                continue;
            };

            let parked = match self.inner.config.retry_policy {
                RetryPolicy::Classified if !error.is_retryable() => {
                    item.park(error.to_string());
                    true
                }
                _ => item.record_failure(error.to_string(), self.inner.config.max_attempts),
            };
            let attempts = item.attempts;
            state.store.save_queue(&queue)?;

            if parked {
                state.not_before.remove(&submission.local_id);
                drop(state);
                tracing::warn!(
                    record_id = %submission.local_id,
                    attempts,
                    error = %error,
                    "Giving up on record until it is retried manually"
                );
                report.parked.push(submission.local_id);
                continue;
            }

            let delay = self
                .inner
                .config
                .backoff
                .delay(attempts, &mut rand::thread_rng());
            let due = Instant::now() + delay;
            state.not_before.insert(submission.local_id.clone(), due);
            drop(state);
            tracing::info!(
                record_id = %submission.local_id,
                attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Submission failed, backing off"
            );
            self.schedule_retry(due);
            report.retry_in = Some(delay);
            return Ok(());
        }
    }

    /// Attempt a queued record once, right now, whatever its state.
    ///
    /// Nothing is reset: a failure leaves the attempt count as it was and a
    /// parked item stays parked.
    pub async fn retry(&self, id: &str) -> Result<RetryOutcome> {
        let submission = {
            let mut state = self.inner.state.lock().await;
            if state.in_flight.contains(id) {
                return Ok(RetryOutcome::InFlight);
            }
            let queue = state.store.queue()?;
            let item = queue
                .get(id)
                .ok_or_else(|| Error::NotQueued(id.to_string()))?;
            let submission = Submission::new(item.id.clone(), item.payload.clone());
            state.in_flight.insert(submission.local_id.clone());
            submission
        };

        tracing::info!(record_id = %id, "Manual retry");
        let result = self.inner.remote.submit(&submission).await;

        let mut state = self.inner.state.lock().await;
        state.in_flight.remove(id);

        match result {
            Ok(canonical) => {
                let promotion = promote(&mut state.store, id, canonical)?;
                state.not_before.remove(id);
                drop(state);
                self.announce(&promotion);
                Ok(RetryOutcome::Submitted(promotion))
            }
            Err(error) => {
                let mut queue = state.store.queue()?;
                if let Some(item) = queue.get_mut(id) {
                    item.last_error = Some(error.to_string());
                    state.store.save_queue(&queue)?;
                }
                tracing::warn!(record_id = %id, error = %error, "Manual retry failed");
                Ok(RetryOutcome::Failed(error))
            }
        }
    }

    /// Delete a record and cancel its pending submission.
    ///
    /// A submission already in flight is not interrupted; if it succeeds the
    /// promotion is still announced but the record is not brought back.
    pub async fn delete(&self, id: &str) -> Result<Option<Record>> {
        let mut state = self.inner.state.lock().await;
        let removed = state.store.delete(id)?;

        let mut queue = state.store.queue()?;
        if queue.remove(id).is_some() {
            state.store.save_queue(&queue)?;
        }
        state.not_before.remove(id);

        tracing::debug!(record_id = %id, found = removed.is_some(), "Deleted record");
        Ok(removed)
    }

    /// Restore the pending-record/queue-item pairing after a crash.
    ///
    /// Pending records without a queue item are queued again; queue items
    /// whose record is gone or already canonical are dropped.
    pub async fn recover(&self) -> Result<Recovery> {
        let mut state = self.inner.state.lock().await;
        let records = state.store.list()?;
        let mut queue = state.store.queue()?;
        let now = self.inner.clock.now_ms();
        let mut recovery = Recovery::default();

        let pending: HashSet<&str> = records
            .iter()
            .filter(|r| r.is_pending())
            .map(|r| r.id().as_str())
            .collect();
        let stale: Vec<RecordId> = queue
            .iter()
            .filter(|item| !pending.contains(item.id.as_str()))
            .map(|item| item.id.clone())
            .collect();
        for id in stale {
            queue.remove(&id);
            state.not_before.remove(&id);
            recovery.pruned += 1;
        }

        for record in &records {
            if let Record::LocalOnly(local) = record {
                if !queue.contains(&local.id) && !state.in_flight.contains(&local.id) {
                    queue.push(QueueItem::new(local.id.clone(), local.payload.clone(), now));
                    recovery.requeued += 1;
                }
            }
        }

        if recovery != Recovery::default() {
            state.store.save_queue(&queue)?;
            tracing::info!(
                requeued = recovery.requeued,
                pruned = recovery.pruned,
                "Recovered queue"
            );
        }
        Ok(recovery)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.inner.state.lock().await.store.get(id)?)
    }

    /// All local records, in insertion order.
    pub async fn records(&self) -> Result<Vec<Record>> {
        Ok(self.inner.state.lock().await.store.list()?)
    }

    pub async fn queue(&self) -> Result<PendingQueue> {
        Ok(self.inner.state.lock().await.store.queue()?)
    }

    /// Sync status of a record, `None` if the record does not exist.
    pub async fn status(&self, id: &str) -> Result<Option<SyncStatus>> {
        let state = self.inner.state.lock().await;
        let Some(record) = state.store.get(id)? else {
            return Ok(None);
        };
        let queue = state.store.queue()?;
        Ok(Some(SyncStatus::of(&record, queue.get(id))))
    }

    /// Merge the remote listing with the local store.
    ///
    /// An unreachable remote is treated as "no listing", so the view falls
    /// back to local records instead of failing.
    pub async fn view(&self, limit: usize) -> Result<MergedView<Record>> {
        let remote = match self.inner.remote.list(limit).await {
            Ok(records) => Some(records.into_iter().map(Record::from).collect::<Vec<_>>()),
            Err(error) => {
                tracing::warn!(error = %error, "Remote listing unavailable, showing local records");
                None
            }
        };
        let local = self.records().await?;
        Ok(merge(remote.as_deref(), &local, limit))
    }

    /// Stop scheduling background work. Timers already armed become no-ops.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.retry_generation.fetch_add(1, Ordering::SeqCst);
    }

    fn announce(&self, promotion: &Promotion) {
        tracing::info!(
            local_id = %promotion.local_id,
            record_id = %promotion.record.id,
            "Record synced"
        );
        let report = self
            .inner
            .notifier
            .publish(&promotion.record, &promotion.local_id);
        if report.failed > 0 {
            tracing::warn!(
                record_id = %promotion.record.id,
                failed = report.failed,
                "Promotion subscriber panicked"
            );
        }
    }

    /// Start a drain in the background.
    fn kick(&self) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.process().await {
                tracing::warn!(error = %e, "Background drain failed");
            }
        });
    }

    /// Arm a timer that drains again at `due`. A newer timer supersedes any
    /// older one still waiting.
    fn schedule_retry(&self, due: Instant) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let generation = self.inner.retry_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(due).await;
            if queue.inner.retry_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if let Err(e) = queue.process().await {
                tracing::warn!(error = %e, "Scheduled drain failed");
            }
        });
    }
}

/// Swap the pending record for its canonical form, then drop its queue item.
///
/// The record is written first: a crash in between leaves a queue item whose
/// resubmission carries the same idempotency key, never a pending record with
/// nothing queued for it.
fn promote<S: LocalStore>(
    store: &mut S,
    local_id: &str,
    canonical: CanonicalRecord,
) -> Result<Promotion> {
    let promotion = match store.get(local_id)? {
        Some(record @ Record::LocalOnly(_)) => {
            let promotion = record.promote(canonical)?;
            store.replace(local_id, promotion.record.clone().into())?;
            promotion
        }
        _ => {
            tracing::debug!(record_id = %local_id, "No pending record to promote");
            Promotion {
                local_id: local_id.to_string(),
                record: canonical,
            }
        }
    };

    let mut queue = store.queue()?;
    if queue.remove(local_id).is_some() {
        store.save_queue(&queue)?;
    }
    Ok(promotion)
}

/// Holds the single-flight flag for the duration of a drain.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

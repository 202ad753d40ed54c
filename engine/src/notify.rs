//! In-process publish/subscribe for record promotions.
//!
//! Subscribers are invoked synchronously, in subscription order, on the
//! publishing thread. A panicking subscriber is isolated: the panic is caught,
//! counted in the [`PublishReport`], and delivery continues with the next one.
//! Nothing is buffered; a publish with no subscribers is simply not observed.

use crate::CanonicalRecord;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Listener = dyn Fn(&CanonicalRecord, &str) + Send + Sync;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Arc<Listener>)>,
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that returned normally
    pub delivered: usize,
    /// Subscribers that panicked
    pub failed: usize,
}

/// Fan-out of `(canonical record, original local id)` notifications.
///
/// Cloning a notifier yields a handle to the same subscriber list.
#[derive(Clone, Default)]
pub struct Notifier {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It stays registered until the returned
    /// [`Subscription`] is dropped or explicitly unsubscribed.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CanonicalRecord, &str) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        let listener: Arc<Listener> = Arc::new(callback);
        registry.listeners.push((id, listener));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver a promotion to every current subscriber.
    pub fn publish(&self, record: &CanonicalRecord, local_id: &str) -> PublishReport {
        // Snapshot the list so callbacks may (un)subscribe without deadlocking.
        let listeners: Vec<Arc<Listener>> = lock(&self.registry)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut report = PublishReport::default();
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(record, local_id))) {
                Ok(()) => report.delivered += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }
}

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Stop receiving notifications.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    /// Keep the callback registered for the notifier's whole lifetime.
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry)
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Callbacks never run under the lock, so a poisoned registry is still consistent.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(id: &str) -> CanonicalRecord {
        CanonicalRecord::new(id, json!({}))
    }

    #[test]
    fn delivers_to_all_subscribers() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = {
            let seen = Arc::clone(&seen);
            notifier.subscribe(move |rec, local| {
                seen.lock().unwrap().push(format!("1:{}<-{}", rec.id, local))
            })
        };
        let s2 = {
            let seen = Arc::clone(&seen);
            notifier.subscribe(move |rec, local| {
                seen.lock().unwrap().push(format!("2:{}<-{}", rec.id, local))
            })
        };

        let report = notifier.publish(&record("srv-1"), "local-1");
        assert_eq!(report.delivered, 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["1:srv-1<-local-1", "2:srv-1<-local-1"]
        );

        drop(s1);
        drop(s2);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let notifier = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _bad = notifier.subscribe(|_, _| panic!("subscriber bug"));
        let _good = {
            let count = Arc::clone(&count);
            notifier.subscribe(move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        let report = notifier.publish(&record("a"), "l");
        assert_eq!(report, PublishReport { delivered: 1, failed: 1 });
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Still works on the next publish.
        notifier.publish(&record("b"), "l");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let notifier = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));

        let sub = {
            let count = Arc::clone(&count);
            notifier.subscribe(move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        notifier.publish(&record("a"), "l");
        sub.unsubscribe();
        notifier.publish(&record("b"), "l");

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn publish_without_subscribers() {
        let notifier = Notifier::new();
        assert_eq!(notifier.publish(&record("a"), "l"), PublishReport::default());
    }

    #[test]
    fn forgotten_subscription_stays() {
        let notifier = Notifier::new();
        notifier.subscribe(|_, _| {}).forget();
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[test]
    fn subscribe_from_inside_callback() {
        let notifier = Notifier::new();
        let inner = notifier.clone();
        let _sub = notifier.subscribe(move |_, _| inner.subscribe(|_, _| {}).forget());

        notifier.publish(&record("a"), "l");
        assert_eq!(notifier.subscriber_count(), 2);
    }
}

//! Edge case tests for tether-engine
//!
//! These tests cover boundary conditions, unusual inputs and the properties
//! the merge and backoff rules must hold for arbitrary inputs.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tether_engine::{
    merge, Backoff, CanonicalRecord, PendingQueue, QueueItem, Record, StoreSnapshot, ViewSource,
};

fn named(id: &str, name: &str) -> Record {
    Record::canonical(id, json!({ "name": name }))
}

fn local_named(id: &str, name: &str) -> Record {
    Record::local(id, json!({ "name": name }), 1000)
}

// ============================================================================
// Merge scenarios
// ============================================================================

#[test]
fn merge_empty_server_guard() {
    let view = merge(Some(&[][..]), &[local_named("l1", "x")], 100);
    assert_eq!(view.ids(), vec!["l1"]);
}

#[test]
fn merge_absent_server() {
    let view = merge(None, &[local_named("only", "x")], 100);
    assert_eq!(view.ids(), vec!["only"]);
    assert_eq!(view.source, ViewSource::Offline);
}

#[test]
fn merge_dedup_ordering() {
    let server = [named("a", "A"), named("b", "B")];
    let view = merge(Some(&server[..]), &[local_named("c", "C")], 100);
    assert_eq!(view.ids(), vec!["a", "b", "c"]);
}

#[test]
fn merge_dedupe_by_id_precedence() {
    let server = [named("x", "ServerX")];
    let locals = [local_named("x", "LocalX"), local_named("y", "Y")];
    let view = merge(Some(&server[..]), &locals, 100);

    assert_eq!(view.ids(), vec!["x", "y"]);
    assert_eq!(view.get("x").unwrap().payload()["name"], "ServerX");
    assert!(!view.get("x").unwrap().is_pending());
}

#[test]
fn merge_works_on_canonical_records_too() {
    let server = [CanonicalRecord::new("a", json!(1))];
    let locals = [CanonicalRecord::new("a", json!(2)), CanonicalRecord::new("b", json!(3))];
    let view = merge(Some(&server[..]), &locals, 10);

    assert_eq!(view.ids(), vec!["a", "b"]);
    assert_eq!(view.entries[0].payload, json!(1));
}

#[test]
fn merge_large_lists() {
    let server: Vec<Record> = (0..5_000).map(|i| named(&format!("s{i}"), "s")).collect();
    let locals: Vec<Record> = (0..5_000)
        .map(|i| local_named(&format!("l{i}"), "l"))
        .collect();

    let view = merge(Some(&server[..]), &locals, 7_500);
    assert_eq!(view.len(), 7_500);
    assert_eq!(view.entries[4_999].id(), "s4999");
    assert_eq!(view.entries[5_000].id(), "l0");
}

// ============================================================================
// Payload edge cases
// ============================================================================

#[test]
fn unicode_payloads_survive_snapshot() {
    let names = [
        "日本語テスト",
        "Привет мир",
        "مرحبا بالعالم",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "Null\0Test",
    ];

    let mut snapshot = StoreSnapshot::new();
    for (i, name) in names.iter().enumerate() {
        snapshot.put(local_named(&format!("item_{i}"), name));
        snapshot
            .queue
            .push(QueueItem::new(format!("item_{i}"), json!({ "name": name }), 1000));
    }

    let restored = StoreSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
    for (i, name) in names.iter().enumerate() {
        let record = restored.get(&format!("item_{i}")).unwrap();
        assert_eq!(record.payload()["name"], *name);
    }
    assert_eq!(restored.queue.len(), names.len());
}

#[test]
fn non_object_payloads_are_opaque() {
    let payloads = [json!(null), json!(42), json!("text"), json!([1, 2, 3])];
    let mut snapshot = StoreSnapshot::new();
    for (i, payload) in payloads.iter().enumerate() {
        snapshot.put(Record::local(format!("p{i}"), payload.clone(), 0));
    }

    let restored = StoreSnapshot::from_json(&snapshot.to_json_pretty().unwrap()).unwrap();
    for (i, payload) in payloads.iter().enumerate() {
        assert_eq!(restored.get(&format!("p{i}")).unwrap().payload(), payload);
    }
}

#[test]
fn empty_id_is_a_valid_key() {
    let mut queue = PendingQueue::new();
    assert!(queue.push(QueueItem::new("", json!({}), 0)));
    assert!(!queue.push(QueueItem::new("", json!({}), 0)));
    assert!(queue.contains(""));
}

// ============================================================================
// Queue bookkeeping
// ============================================================================

#[test]
fn attempts_saturate() {
    let mut item = QueueItem::new("a", json!({}), 0);
    item.attempts = u32::MAX;
    item.record_failure("still failing", u32::MAX);
    assert_eq!(item.attempts, u32::MAX);
    assert!(item.parked);
}

#[test]
fn single_attempt_budget_parks_on_first_failure() {
    let mut item = QueueItem::new("a", json!({}), 0);
    assert!(item.record_failure("boom", 1));
}

// ============================================================================
// Properties
// ============================================================================

fn id_strategy() -> impl Strategy<Value = String> {
    "[a-e]{1,2}"
}

proptest! {
    #[test]
    fn server_entries_always_win(
        server_ids in prop::collection::vec(id_strategy(), 0..20),
        local_ids in prop::collection::vec(id_strategy(), 0..20),
    ) {
        let server: Vec<Record> = server_ids.iter().map(|id| named(id, "server")).collect();
        let locals: Vec<Record> = local_ids.iter().map(|id| local_named(id, "local")).collect();

        let view = merge(Some(&server[..]), &locals, usize::MAX);

        // At most one entry per id.
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for id in view.ids() {
            *counts.entry(id).or_default() += 1;
        }
        prop_assert!(counts.values().all(|&c| c == 1));

        if !server.is_empty() || locals.is_empty() {
            // Every server id appears with the server version.
            for id in &server_ids {
                let entry = view.get(id).unwrap();
                prop_assert_eq!(&entry.payload()["name"], "server");
            }
            // Every local-only id survives.
            for id in &local_ids {
                prop_assert!(view.get(id).is_some());
            }
        } else {
            prop_assert_eq!(view.source, ViewSource::EmptyRemote);
            prop_assert!(view.entries.iter().all(|r| r.is_pending()));
        }
    }

    #[test]
    fn merge_respects_limit(
        server_ids in prop::collection::vec(id_strategy(), 0..20),
        local_ids in prop::collection::vec(id_strategy(), 0..20),
        limit in 0usize..25,
    ) {
        let server: Vec<Record> = server_ids.iter().map(|id| named(id, "server")).collect();
        let locals: Vec<Record> = local_ids.iter().map(|id| local_named(id, "local")).collect();

        let full = merge(Some(&server[..]), &locals, usize::MAX);
        let bounded = merge(Some(&server[..]), &locals, limit);

        prop_assert!(bounded.len() <= limit);
        prop_assert_eq!(&bounded.entries[..], &full.entries[..bounded.len()]);
    }

    #[test]
    fn backoff_is_monotonic_and_bounded(
        base in 1u64..5_000,
        extra in 0u64..120_000,
        jitter in 0u64..10_000,
        seed in any::<u64>(),
    ) {
        let backoff = Backoff::new(base, base + extra, jitter);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut previous = Duration::ZERO;
        for attempts in 0..70u32 {
            let base_delay = backoff.base_delay(attempts);
            prop_assert!(base_delay >= previous);
            prop_assert!(base_delay <= Duration::from_millis(backoff.cap_ms));
            previous = base_delay;

            let delay = backoff.delay(attempts, &mut rng);
            prop_assert!(delay >= base_delay);
            prop_assert!(delay <= backoff.max_delay());
        }
    }
}

//! Integration tests for the manual match queue.
//!
//! Tests verify the operator resolution flow end to end:
//! 1. Resolving a bank-feed item attaches, updates LTV and learns the label
//! 2. The learned mapping auto-matches the counterparty's next payment
//! 3. A resolved item cannot be resolved twice
//! 4. Resolving an unknown queue id is an error
//! 5. Closing as unmatchable attaches nothing and records its provenance
//! 6. Redelivery of a queued payment never duplicates the queue item
//! 7. A confirmed-unmatchable decision survives redelivery

use revrecon_core::{engine::Engine, error::EngineError, transaction::Provider};
use serde_json::json;

fn build() -> Engine {
    Engine::in_memory().expect("in-memory engine")
}

fn bank_payment(uid: &str, minor: i64, counterparty: &str) -> serde_json::Value {
    json!({ "feedItem": {
        "feedItemUid": uid,
        "amount": { "minorUnits": minor, "currency": "GBP" },
        "transactionTime": "2025-04-02T09:30:00Z",
        "status": "SETTLED",
        "direction": "IN",
        "counterPartyName": counterparty
    }})
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1 + 2: resolve attaches, learns the label, and the next payment
// from the same counterparty matches automatically
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn resolution_learns_mapping_and_next_payment_auto_matches() {
    let engine = build();

    let jamie = engine
        .intake_lead(&json!({
            "first_name": "Jamie", "last_name": "Smith",
            "email": "jamie@example.com", "source": "referral"
        }))
        .unwrap();

    // A £1,200 bank transfer under a label no tier can resolve.
    let result = engine
        .ingest(Provider::Starling, &bank_payment("fi-100", 120_000, "J SMITH REF 44"))
        .unwrap();
    assert!(result.queued);

    let items = engine.open_queue_items(None).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item.reason, "no_structured_identifier");

    engine
        .resolve_queue_item(&items[0].item.queue_id, Some(&jamie), "operator")
        .unwrap();

    // Attachment, totals and the learned mapping all landed together.
    let txn = engine.store.get_txn(&items[0].txn.txn_id).unwrap().unwrap();
    assert_eq!(txn.identity_id.as_deref(), Some(jamie.as_str()));
    assert_eq!(engine.ltv_summary(&jamie).unwrap().all_minor, 120_000);
    assert_eq!(engine.store.counterparty_count().unwrap(), 1);
    assert_eq!(engine.store.event_count("mapping_learned").unwrap(), 1);
    assert_eq!(engine.store.open_queue_count().unwrap(), 0);

    // The counterparty's next payment skips the queue entirely.
    let next = engine
        .ingest(Provider::Starling, &bank_payment("fi-101", 4500, "J SMITH REF 44"))
        .unwrap();
    assert!(next.matched, "learned mapping should match at ingest");
    assert!(!next.queued);
    assert_eq!(engine.ltv_summary(&jamie).unwrap().all_minor, 124_500);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: double resolution is rejected
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn resolved_item_cannot_be_resolved_twice() {
    let engine = build();
    let id = engine
        .intake_lead(&json!({ "first_name": "Ana", "email": "ana@example.com" }))
        .unwrap();

    engine
        .ingest(Provider::Starling, &bank_payment("fi-200", 1000, "A PEREZ"))
        .unwrap();
    let queue_id = engine.open_queue_items(None).unwrap()[0].item.queue_id.clone();

    engine.resolve_queue_item(&queue_id, Some(&id), "operator").unwrap();
    let second = engine.resolve_queue_item(&queue_id, Some(&id), "operator");

    assert!(matches!(second, Err(EngineError::QueueItemAlreadyResolved(_))));
    assert_eq!(
        engine.ltv_summary(&id).unwrap().all_minor,
        1000,
        "the failed second resolution must not re-apply side effects"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: unknown queue id
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unknown_queue_id_is_an_error() {
    let engine = build();
    let result = engine.resolve_queue_item("nope", None, "operator");
    assert!(matches!(result, Err(EngineError::QueueItemNotFound(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: confirmed-unmatchable closes without attaching
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unmatchable_resolution_attaches_nothing() {
    let engine = build();

    engine
        .ingest(Provider::Starling, &bank_payment("fi-300", 9900, "HMRC VAT"))
        .unwrap();
    let view = engine.open_queue_items(None).unwrap().remove(0);

    engine
        .resolve_queue_item(&view.item.queue_id, None, "operator")
        .unwrap();

    assert_eq!(engine.store.open_queue_count().unwrap(), 0);
    let txn = engine.store.get_txn(&view.txn.txn_id).unwrap().unwrap();
    assert!(txn.identity_id.is_none());
    assert_eq!(engine.store.counterparty_count().unwrap(), 0, "nothing to learn");

    // A no-identity close always records its own provenance, whatever
    // string the caller passed.
    let item = engine.store.get_queue_item(&view.item.queue_id).unwrap().unwrap();
    assert_eq!(item.resolved_by.as_deref(), Some("confirmed-unmatchable"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: one open item per transaction, even under redelivery
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn redelivery_does_not_duplicate_queue_item() {
    let engine = build();
    let payload = bank_payment("fi-400", 700, "UNKNOWN PAYER");

    engine.ingest(Provider::Starling, &payload).unwrap();
    engine.ingest(Provider::Starling, &payload).unwrap();
    engine.ingest(Provider::Starling, &payload).unwrap();

    assert_eq!(engine.store.txn_count().unwrap(), 1);
    assert_eq!(engine.store.open_queue_count().unwrap(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: confirmed-unmatchable is terminal, even under redelivery
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unmatchable_decision_survives_redelivery() {
    let engine = build();
    let payload = bank_payment("fi-500", 9900, "HMRC VAT");

    engine.ingest(Provider::Starling, &payload).unwrap();
    let queue_id = engine.open_queue_items(None).unwrap()[0].item.queue_id.clone();
    engine.resolve_queue_item(&queue_id, None, "operator").unwrap();
    assert_eq!(engine.store.open_queue_count().unwrap(), 0);

    let again = engine.ingest(Provider::Starling, &payload).unwrap();

    assert!(!again.matched);
    assert!(!again.queued, "redelivery must not reopen work");
    assert_eq!(engine.store.open_queue_count().unwrap(), 0);
    let item = engine.store.get_queue_item(&queue_id).unwrap().unwrap();
    assert_eq!(item.resolved_by.as_deref(), Some("confirmed-unmatchable"));
}

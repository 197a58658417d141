//! Integration tests for the ads attribution ledger.
//!
//! Tests verify the at-most-once ledger row per payment:
//! 1. A paid-channel match writes exactly one ledger row
//! 2. Organic identities never reach the ledger
//! 3. Redelivery and detach/re-attach cycles do not duplicate rows
//! 4. Failed payments are never attributed
//! 5. A payment that settles after attachment still reaches the ledger

use revrecon_core::{engine::Engine, transaction::Provider};
use serde_json::json;

fn build() -> Engine {
    Engine::in_memory().expect("in-memory engine")
}

fn paid_lead(engine: &Engine, email: &str) -> String {
    engine
        .intake_lead(&json!({
            "first_name": "Ria", "email": email, "source": "Instagram Ads"
        }))
        .unwrap()
}

fn charge(id: &str, amount: i64, status: &str, email: &str) -> serde_json::Value {
    json!({
        "id": id, "object": "charge", "amount": amount, "currency": "gbp",
        "created": 1714000000, "status": status,
        "billing_details": { "email": email }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: one ledger row per paid-channel payment
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn paid_channel_match_writes_one_ledger_row() {
    let engine = build();
    let id = paid_lead(&engine, "ria@example.com");

    let result = engine
        .ingest(Provider::Stripe, &charge("ch_1", 4500, "succeeded", "ria@example.com"))
        .unwrap();

    let rows = engine.store.ads_attributions_for_identity(&id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].txn_id, result.txn_id);
    assert_eq!(rows[0].amount_minor, 4500, "the row carries the payment amount");
    assert_eq!(engine.store.event_count("ads_attribution_recorded").unwrap(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: organic identities stay off the ledger
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn organic_identity_is_never_attributed() {
    let engine = build();
    engine
        .intake_lead(&json!({
            "first_name": "Tom", "email": "tom@example.com", "source": "word of mouth"
        }))
        .unwrap();

    engine
        .ingest(Provider::Stripe, &charge("ch_2", 9900, "succeeded", "tom@example.com"))
        .unwrap();

    assert_eq!(engine.store.ads_attribution_count().unwrap(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: replays and re-attachment never duplicate the row
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn replays_do_not_duplicate_ledger_rows() {
    let engine = build();
    paid_lead(&engine, "ria@example.com");
    let payload = charge("ch_3", 4500, "succeeded", "ria@example.com");

    let first = engine.ingest(Provider::Stripe, &payload).unwrap();
    engine.ingest(Provider::Stripe, &payload).unwrap();
    assert_eq!(engine.store.ads_attribution_count().unwrap(), 1);

    // Detach, then let a redelivery re-attach through the email tier.
    engine.detach_transaction(&first.txn_id).unwrap();
    let again = engine.ingest(Provider::Stripe, &payload).unwrap();
    assert!(again.matched);
    assert_eq!(
        engine.store.ads_attribution_count().unwrap(),
        1,
        "the ledger records conversions, not attachment churn"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: failures are never conversions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn failed_payment_is_not_attributed() {
    let engine = build();
    paid_lead(&engine, "ria@example.com");

    engine
        .ingest(Provider::Stripe, &charge("ch_4", 4500, "failed", "ria@example.com"))
        .unwrap();

    assert_eq!(engine.store.ads_attribution_count().unwrap(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: late settlement of an attached payment still converts
// ─────────────────────────────────────────────────────────────────────────────

fn bank_item(uid: &str, minor: i64, status: &str) -> serde_json::Value {
    json!({ "feedItem": {
        "feedItemUid": uid,
        "amount": { "minorUnits": minor, "currency": "GBP" },
        "transactionTime": "2025-04-02T09:30:00Z",
        "status": status,
        "direction": "IN",
        "counterPartyName": "R PATEL REF 1"
    }})
}

#[test]
fn late_settlement_still_reaches_the_ledger() {
    let engine = build();
    let id = paid_lead(&engine, "ria@example.com");

    // A not-yet-settled bank item, manually attached to the paid
    // identity while still pending.
    engine
        .ingest(Provider::Starling, &bank_item("fi-50", 120_000, "UPCOMING"))
        .unwrap();
    let queue_id = engine.open_queue_items(None).unwrap()[0].item.queue_id.clone();
    engine.resolve_queue_item(&queue_id, Some(&id), "operator").unwrap();

    // Attached, but no money received yet: no conversion, no totals.
    assert_eq!(engine.store.ads_attribution_count().unwrap(), 0);
    assert_eq!(engine.ltv_summary(&id).unwrap().all_minor, 0);

    // The settlement arrives as a redelivery of the same feed item.
    engine
        .ingest(Provider::Starling, &bank_item("fi-50", 120_000, "SETTLED"))
        .unwrap();

    let summary = engine.ltv_summary(&id).unwrap();
    assert_eq!(summary.all_minor, 120_000);
    assert_eq!(summary.paid_minor, 120_000);
    let rows = engine.store.ads_attributions_for_identity(&id).unwrap();
    assert_eq!(rows.len(), 1, "the ledger must see the settled conversion");
    assert_eq!(rows[0].amount_minor, 120_000);
}

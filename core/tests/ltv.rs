//! Integration tests for the LTV aggregator.
//!
//! Tests verify that totals are a pure function of the attached set:
//! 1. Only settled transactions contribute
//! 2. Product labels bucket into category totals
//! 3. Paid-channel attribution is all-or-nothing per identity
//! 4. Detaching restores totals to the never-attached value
//! 5. Recompute is idempotent and the batch pass covers everyone

use revrecon_core::{classify::Category, engine::Engine, transaction::Provider};
use serde_json::json;

fn build() -> Engine {
    Engine::in_memory().expect("in-memory engine")
}

fn charge(id: &str, amount: i64, status: &str, email: &str, description: &str) -> serde_json::Value {
    json!({
        "id": id, "object": "charge", "amount": amount, "currency": "gbp",
        "created": 1714000000, "status": status, "description": description,
        "billing_details": { "email": email }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: failed payments are stored but never counted
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn only_settled_transactions_count() {
    let engine = build();
    let id = engine
        .intake_lead(&json!({ "first_name": "Kim", "email": "kim@example.com" }))
        .unwrap();

    engine
        .ingest(Provider::Stripe, &charge("ch_ok", 4500, "succeeded", "kim@example.com", "PT Session"))
        .unwrap();
    engine
        .ingest(Provider::Stripe, &charge("ch_bad", 900, "failed", "kim@example.com", "PT Session"))
        .unwrap();

    assert_eq!(engine.store.txn_count().unwrap(), 2, "the failure is kept for audit");
    let summary = engine.ltv_summary(&id).unwrap();
    assert_eq!(summary.all_minor, 4500);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: product labels bucket into categories
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn product_labels_bucket_into_categories() {
    let engine = build();
    let id = engine
        .intake_lead(&json!({ "first_name": "Sam", "email": "sam@example.com" }))
        .unwrap();

    engine
        .ingest(
            Provider::Stripe,
            &charge("ch_1", 30_000, "succeeded", "sam@example.com", "Personal Training Block x10"),
        )
        .unwrap();
    engine
        .ingest(
            Provider::Glofox,
            &json!({ "payment": {
                "payment_id": "P-1",
                "amount": 45.0, "currency": "gbp", "status": "paid",
                "created_at": "2025-03-01T10:00:00Z",
                "member_email": "sam@example.com",
                "membership_name": "Unlimited Classes"
            }}),
        )
        .unwrap();
    // No label at all: counted in the total, in no category.
    engine
        .ingest(Provider::Stripe, &charge("ch_2", 1000, "succeeded", "sam@example.com", ""))
        .unwrap();

    let summary = engine.ltv_summary(&id).unwrap();
    assert_eq!(summary.all_minor, 35_500);
    assert_eq!(
        summary.categories,
        vec![(Category::Classes, 4500), (Category::Pt, 30_000)],
        "categories are reported in stable (alphabetical) order"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: paid attribution is all-or-nothing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn paid_channel_is_all_or_nothing() {
    let engine = build();

    let paid = engine
        .intake_lead(&json!({
            "first_name": "Ria", "email": "ria@example.com", "source": "Facebook Ads"
        }))
        .unwrap();
    let organic = engine
        .intake_lead(&json!({
            "first_name": "Tom", "email": "tom@example.com", "source": "referral"
        }))
        .unwrap();

    engine
        .ingest(Provider::Stripe, &charge("ch_r1", 4500, "succeeded", "ria@example.com", "PT Session"))
        .unwrap();
    engine
        .ingest(Provider::Stripe, &charge("ch_r2", 1500, "succeeded", "ria@example.com", "class"))
        .unwrap();
    engine
        .ingest(Provider::Stripe, &charge("ch_t1", 9900, "succeeded", "tom@example.com", "PT Session"))
        .unwrap();

    let ria = engine.ltv_summary(&paid).unwrap();
    assert!(ria.is_paid_channel);
    assert_eq!(ria.all_minor, 6000);
    assert_eq!(ria.paid_minor, 6000, "paid total equals the whole lifetime value");

    let tom = engine.ltv_summary(&organic).unwrap();
    assert!(!tom.is_paid_channel);
    assert_eq!(tom.all_minor, 9900);
    assert_eq!(tom.paid_minor, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: detaching restores the never-attached totals
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn detach_restores_totals() {
    let engine = build();
    let id = engine
        .intake_lead(&json!({ "first_name": "Eve", "email": "eve@example.com" }))
        .unwrap();

    let result = engine
        .ingest(Provider::Stripe, &charge("ch_e", 4500, "succeeded", "eve@example.com", "PT Session"))
        .unwrap();
    assert_eq!(engine.ltv_summary(&id).unwrap().all_minor, 4500);

    engine.detach_transaction(&result.txn_id).unwrap();

    let summary = engine.ltv_summary(&id).unwrap();
    assert_eq!(summary.all_minor, 0);
    assert!(summary.categories.is_empty());
    let txn = engine.store.get_txn(&result.txn_id).unwrap().unwrap();
    assert!(txn.identity_id.is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: recompute is idempotent; the batch pass covers every identity
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn recompute_is_idempotent_and_batch_covers_all() {
    let engine = build();
    let a = engine
        .intake_lead(&json!({ "first_name": "A", "email": "a@example.com" }))
        .unwrap();
    let b = engine
        .intake_lead(&json!({ "first_name": "B", "email": "b@example.com" }))
        .unwrap();

    engine
        .ingest(Provider::Stripe, &charge("ch_a", 2000, "succeeded", "a@example.com", "class"))
        .unwrap();

    let once = engine.recompute_ltv(&a).unwrap();
    let twice = engine.recompute_ltv(&a).unwrap();
    assert_eq!(once, twice, "recompute from the same inputs is a fixed point");

    let processed = engine.recompute_all_ltv().unwrap();
    assert_eq!(processed, 2);
    assert_eq!(engine.ltv_summary(&b).unwrap().all_minor, 0);
}

//! Integration tests for the tiered identity matcher.
//!
//! Tests verify tier ordering and the exact-name rules:
//! 1. A processor customer id outranks every other signal
//! 2. Email outranks exact-name when both would hit
//! 3. A free-text name attaches when exactly one identity carries it
//! 4. Two identities with the same name is ambiguity, not a guess
//! 5. Company suffixes are ignored when comparing names

use revrecon_core::{
    engine::{Engine, NewIdentity},
    store::IdentityRow,
    transaction::Provider,
};
use serde_json::json;

fn build() -> Engine {
    Engine::in_memory().expect("in-memory engine")
}

fn attached_identity(engine: &Engine, provider: Provider, external_id: &str) -> Option<String> {
    engine
        .store
        .get_txn_by_external(provider, external_id)
        .unwrap()
        .expect("transaction stored")
        .identity_id
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: processor customer id wins over email
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn processor_customer_id_outranks_email() {
    let engine = build();

    // Identity A is known only by its Stripe customer id.
    let a = IdentityRow {
        identity_id: "id-a".into(),
        display_name: Some("Jane Doe".into()),
        processor_customer_id: Some("cus_9".into()),
        ..IdentityRow::default()
    };
    engine.store.insert_identity(&a).unwrap();
    // Identity B carries the email the charge will also carry.
    let b = IdentityRow {
        identity_id: "id-b".into(),
        email: Some("jane@example.com".into()),
        ..IdentityRow::default()
    };
    engine.store.insert_identity(&b).unwrap();

    engine
        .ingest(
            Provider::Stripe,
            &json!({
                "id": "ch_1", "object": "charge", "amount": 4500, "currency": "gbp",
                "created": 1714000000, "status": "succeeded",
                "customer": "cus_9",
                "billing_details": { "email": "jane@example.com" }
            }),
        )
        .unwrap();

    assert_eq!(
        attached_identity(&engine, Provider::Stripe, "stripe_ch_1").as_deref(),
        Some("id-a"),
        "the external-system id tier must win"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: email wins over an exact name hit
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn email_outranks_exact_name() {
    let engine = build();

    let by_email = engine
        .create_identity(NewIdentity {
            email: Some("jane@example.com".into()),
            display_name: Some("Janet Doherty".into()),
            ..NewIdentity::default()
        })
        .unwrap();
    engine
        .create_identity(NewIdentity {
            display_name: Some("Jane Doe".into()),
            ..NewIdentity::default()
        })
        .unwrap();

    engine
        .ingest(
            Provider::Stripe,
            &json!({
                "id": "ch_2", "object": "charge", "amount": 900, "currency": "gbp",
                "created": 1714000000, "status": "succeeded",
                "billing_details": { "name": "Jane Doe", "email": "Jane@Example.com" }
            }),
        )
        .unwrap();

    assert_eq!(
        attached_identity(&engine, Provider::Stripe, "stripe_ch_2").as_deref(),
        Some(by_email.as_str())
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: a lone exact-name candidate attaches
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn single_exact_name_candidate_attaches() {
    let engine = build();

    let sam = engine
        .create_identity(NewIdentity {
            display_name: Some("Sam Carter".into()),
            ..NewIdentity::default()
        })
        .unwrap();

    // Bank feed item: free-text counterparty name is the only signal.
    let result = engine
        .ingest(
            Provider::Starling,
            &json!({ "feedItem": {
                "feedItemUid": "fi-1",
                "amount": { "minorUnits": 3000, "currency": "GBP" },
                "transactionTime": "2025-04-02T09:30:00Z",
                "status": "SETTLED", "direction": "IN",
                "counterPartyName": "Sam Carter"
            }}),
        )
        .unwrap();

    assert!(result.matched);
    assert_eq!(
        attached_identity(&engine, Provider::Starling, "starling_fi-1").as_deref(),
        Some(sam.as_str())
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: duplicate names are ambiguity, never an arbitrary pick
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn ambiguous_name_goes_to_queue_with_candidates() {
    let engine = build();

    let first = engine
        .create_identity(NewIdentity {
            display_name: Some("Alex Gray".into()),
            ..NewIdentity::default()
        })
        .unwrap();
    let second = engine
        .create_identity(NewIdentity {
            display_name: Some("Alex Gray".into()),
            ..NewIdentity::default()
        })
        .unwrap();

    let result = engine
        .ingest(
            Provider::Starling,
            &json!({
                "feedItemUid": "fi-2",
                "amount": { "minorUnits": 5000, "currency": "GBP" },
                "transactionTime": "2025-04-02T09:30:00Z",
                "status": "SETTLED", "direction": "IN",
                "counterPartyName": "ALEX GRAY"
            }),
        )
        .unwrap();

    assert!(!result.matched);
    assert!(result.queued);

    let items = engine.open_queue_items(None).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item.reason, "ambiguous_name");
    assert!(items[0].item.candidates.contains(&first));
    assert!(items[0].item.candidates.contains(&second));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: company suffixes do not block a name match
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn company_suffixes_are_ignored_in_name_comparison() {
    let engine = build();

    let acme = engine
        .create_identity(NewIdentity {
            display_name: Some("Acme Ltd".into()),
            channel: Some("corporate".into()),
            ..NewIdentity::default()
        })
        .unwrap();

    let result = engine
        .ingest(
            Provider::Starling,
            &json!({
                "feedItemUid": "fi-3",
                "amount": { "minorUnits": 250_000, "currency": "GBP" },
                "transactionTime": "2025-04-02T09:30:00Z",
                "status": "SETTLED", "direction": "IN",
                "counterPartyName": "ACME LIMITED"
            }),
        )
        .unwrap();

    assert!(result.matched);
    assert_eq!(
        attached_identity(&engine, Provider::Starling, "starling_fi-3").as_deref(),
        Some(acme.as_str())
    );
}

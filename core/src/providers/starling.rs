//! Starling normalizer — bank feed items. These carry no email or phone,
//! only a human-entered counterparty name and reference, which is why
//! they lean on the counterparty mapping tier downstream.

use super::{malformed, pluck_str, pluck_timestamp, Normalizer};
use crate::classify::Category;
use crate::error::EngineResult;
use crate::transaction::{
    synthesize_external_id, CanonicalTransaction, Confidence, IdentitySignals, Provider,
    TxnStatus,
};
use serde_json::Value;
use uuid::Uuid;

pub struct StarlingNormalizer;

impl Normalizer for StarlingNormalizer {
    fn provider(&self) -> Provider {
        Provider::Starling
    }

    fn normalize(&self, raw: &Value) -> EngineResult<CanonicalTransaction> {
        let item = unwrap_feed_item(raw);

        let occurred_at = pluck_timestamp(item, &["transactionTime", "updatedAt"])
            .ok_or_else(|| malformed(Provider::Starling, "missing transaction time"))?;

        let amount_minor = extract_amount(item);
        let currency = extract_currency(item);

        let counterparty = pluck_str(item, &["counterPartyName"]).map(str::to_string);
        let reference = pluck_str(item, &["reference"]).map(str::to_string);

        let external_id = match pluck_str(item, &["feedItemUid"]) {
            Some(uid) => format!("starling_{uid}"),
            None => {
                let signal = counterparty
                    .as_deref()
                    .or(reference.as_deref())
                    .ok_or_else(|| {
                        malformed(Provider::Starling, "no feedItemUid and no counterparty")
                    })?;
                synthesize_external_id(Provider::Starling, signal, amount_minor, occurred_at)
            }
        };

        let status = match pluck_str(item, &["status"]).unwrap_or("") {
            "SETTLED" => TxnStatus::Settled,
            "DECLINED" | "REVERSED" => TxnStatus::Failed,
            _ => TxnStatus::Pending,
        };

        Ok(CanonicalTransaction {
            txn_id: Uuid::new_v4().to_string(),
            provider: Provider::Starling,
            external_id,
            amount_minor,
            currency,
            occurred_at,
            status,
            confidence: Confidence::NeedsReview,
            person_name: counterparty.clone(),
            reference: reference.clone(),
            product_label: pluck_str(item, &["spendingCategory"]).map(str::to_string),
            product_category: Category::Unknown,
            signals: IdentitySignals {
                // Bank feeds have no structured identity; the free-text
                // name rides along for the mapping and fuzzy tiers.
                full_name: counterparty.or(reference),
                ..IdentitySignals::default()
            },
            identity_id: None,
            raw_payload: raw.clone(),
        })
    }
}

/// Webhooks wrap the item as `feedItem` or `content`; exports deliver it
/// bare.
fn unwrap_feed_item(raw: &Value) -> &Value {
    raw.get("feedItem")
        .or_else(|| raw.get("content"))
        .filter(|v| v.is_object())
        .unwrap_or(raw)
}

/// Minor units from the first amount block present, negated for
/// outgoing items so refunds and outbound transfers carry their sign.
fn extract_amount(item: &Value) -> i64 {
    let minor = ["amount", "totalAmount", "sourceAmount"]
        .iter()
        .find_map(|key| item.get(*key)?.get("minorUnits")?.as_i64())
        .unwrap_or(0);
    match item.get("direction").and_then(Value::as_str) {
        Some("OUT") => -minor.abs(),
        _ => minor,
    }
}

fn extract_currency(item: &Value) -> String {
    ["amount", "totalAmount", "sourceAmount"]
        .iter()
        .find_map(|key| item.get(*key)?.get("currency")?.as_str().map(str::to_uppercase))
        .unwrap_or_else(|| "GBP".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settled_feed_item_normalizes() {
        let raw = json!({ "feedItem": {
            "feedItemUid": "fi-123",
            "amount": { "minorUnits": 120000, "currency": "GBP" },
            "transactionTime": "2025-04-02T09:30:00Z",
            "status": "SETTLED",
            "direction": "IN",
            "counterPartyName": "J SMITH REF 44",
            "spendingCategory": "INCOME"
        }});
        let txn = StarlingNormalizer.normalize(&raw).unwrap();
        assert_eq!(txn.external_id, "starling_fi-123");
        assert_eq!(txn.amount_minor, 120_000);
        assert_eq!(txn.status, TxnStatus::Settled);
        assert!(txn.signals.email.is_none());
        assert_eq!(txn.counterparty_label(), Some("J SMITH REF 44"));
    }

    #[test]
    fn outgoing_items_are_negative() {
        let raw = json!({
            "feedItemUid": "fi-9",
            "amount": { "minorUnits": 2500, "currency": "GBP" },
            "transactionTime": "2025-04-02T09:30:00Z",
            "status": "SETTLED",
            "direction": "OUT",
            "counterPartyName": "GYM SUPPLIES LTD"
        });
        let txn = StarlingNormalizer.normalize(&raw).unwrap();
        assert_eq!(txn.amount_minor, -2500);
    }

    #[test]
    fn upcoming_item_stays_pending() {
        let raw = json!({
            "feedItemUid": "fi-10",
            "amount": { "minorUnits": 100, "currency": "GBP" },
            "transactionTime": "2025-04-02T09:30:00Z",
            "status": "UPCOMING",
            "counterPartyName": "A PAYER"
        });
        let txn = StarlingNormalizer.normalize(&raw).unwrap();
        assert_eq!(txn.status, TxnStatus::Pending);
    }

    #[test]
    fn missing_uid_and_counterparty_is_rejected() {
        let raw = json!({
            "amount": { "minorUnits": 100, "currency": "GBP" },
            "transactionTime": "2025-04-02T09:30:00Z"
        });
        assert!(StarlingNormalizer.normalize(&raw).is_err());
    }
}

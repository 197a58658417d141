//! Stripe normalizer — charges, payment intents, invoices and checkout
//! sessions, delivered bare or inside a webhook event envelope.

use super::{currency_or, malformed, pluck_i64, pluck_str, pluck_timestamp, Normalizer};
use crate::classify::Category;
use crate::error::EngineResult;
use crate::normalize::{normalize_email, normalize_phone};
use crate::transaction::{
    CanonicalTransaction, Confidence, IdentitySignals, Provider, TxnStatus,
};
use serde_json::Value;
use uuid::Uuid;

pub struct StripeNormalizer;

impl Normalizer for StripeNormalizer {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    fn normalize(&self, raw: &Value) -> EngineResult<CanonicalTransaction> {
        let object = unwrap_event_envelope(raw);

        let kind = object.get("object").and_then(Value::as_str).unwrap_or("");
        let native_id = pluck_str(object, &["id", "payment_intent"]);
        let external_id = match (kind, native_id) {
            (_, None) => {
                return Err(malformed(Provider::Stripe, "payload carries no object id"))
            }
            ("payment_intent", Some(id)) => format!("stripe_pi_{id}"),
            ("invoice", Some(id)) => format!("stripe_inv_{id}"),
            ("checkout.session", Some(id)) => format!("stripe_cs_{id}"),
            (_, Some(id)) => format!("stripe_{id}"),
        };

        let occurred_at = pluck_timestamp(object, &["created"])
            .ok_or_else(|| malformed(Provider::Stripe, "missing created timestamp"))?;

        // amount_received (intent) > amount (charge) > amount_paid
        // (invoice) > amount_total (checkout session). Already minor units.
        let amount_minor = pluck_i64(
            object,
            &["amount_received", "amount", "amount_paid", "amount_total"],
        )
        .unwrap_or(0);

        let charge = object
            .get("charges")
            .and_then(|c| c.get("data"))
            .and_then(|d| d.get(0));
        let billing = object
            .get("billing_details")
            .or_else(|| charge.and_then(|c| c.get("billing_details")));
        let customer_details = object.get("customer_details");
        let metadata = object.get("metadata");

        let email = normalize_email(
            pluck_str(object, &["receipt_email", "customer_email"])
                .or_else(|| billing.and_then(|b| pluck_str(b, &["email"])))
                .or_else(|| customer_details.and_then(|d| pluck_str(d, &["email"]))),
        );
        let phone = normalize_phone(
            billing
                .and_then(|b| pluck_str(b, &["phone"]))
                .or_else(|| customer_details.and_then(|d| pluck_str(d, &["phone"]))),
        );
        let person_name = billing
            .and_then(|b| pluck_str(b, &["name"]))
            .or_else(|| customer_details.and_then(|d| pluck_str(d, &["name"])))
            .or_else(|| pluck_str(object, &["customer_name"]))
            .map(str::to_string);

        // `customer` is either the id string or an expanded object.
        let processor_customer_id = object
            .get("customer")
            .and_then(|c| {
                c.as_str()
                    .or_else(|| c.get("id").and_then(Value::as_str))
            })
            .map(str::to_string);

        let status = resolve_status(object);
        let product_label = pluck_str(object, &["description"])
            .or_else(|| metadata.and_then(|m| pluck_str(m, &["product_name", "product", "product_type"])))
            .map(str::to_string);

        Ok(CanonicalTransaction {
            txn_id: Uuid::new_v4().to_string(),
            provider: Provider::Stripe,
            external_id,
            amount_minor,
            currency: currency_or(object, &["currency"], "GBP"),
            occurred_at,
            status,
            confidence: if status == TxnStatus::Settled {
                Confidence::High
            } else {
                Confidence::NeedsReview
            },
            person_name: person_name.clone(),
            reference: native_id.map(str::to_string),
            product_label,
            product_category: Category::Unknown,
            signals: IdentitySignals {
                email,
                phone,
                full_name: person_name,
                crm_contact_id: None,
                member_id: None,
                processor_customer_id,
            },
            identity_id: None,
            raw_payload: raw.clone(),
        })
    }
}

/// Webhook deliveries wrap the object as `data.object`; direct API
/// payloads are the object itself.
fn unwrap_event_envelope(raw: &Value) -> &Value {
    raw.get("data")
        .and_then(|d| d.get("object"))
        .or_else(|| raw.get("object").filter(|o| o.is_object()))
        .unwrap_or(raw)
}

fn resolve_status(object: &Value) -> TxnStatus {
    let status = pluck_str(object, &["payment_status", "status"])
        .unwrap_or("")
        .to_lowercase();
    match status.as_str() {
        "succeeded" | "paid" => TxnStatus::Settled,
        "failed" | "canceled" => TxnStatus::Failed,
        _ => {
            if object.get("paid").and_then(Value::as_bool).unwrap_or(false) {
                TxnStatus::Settled
            } else {
                TxnStatus::NeedsReview
            }
        }
    }
}

//! Glofox normalizer — gym membership platform payments, delivered by
//! webhook (`{ payment: {...} }`) or as a bare payment object.

use super::{currency_or, malformed, pluck_str, pluck_timestamp, Normalizer};
use crate::classify::Category;
use crate::error::EngineResult;
use crate::normalize::{normalize_email, normalize_phone};
use crate::transaction::{
    synthesize_external_id, CanonicalTransaction, Confidence, IdentitySignals, Provider,
    TxnStatus,
};
use serde_json::Value;
use uuid::Uuid;

pub struct GlofoxNormalizer;

impl Normalizer for GlofoxNormalizer {
    fn provider(&self) -> Provider {
        Provider::Glofox
    }

    fn normalize(&self, raw: &Value) -> EngineResult<CanonicalTransaction> {
        let payment = raw.get("payment").filter(|p| p.is_object()).unwrap_or(raw);

        let occurred_at = pluck_timestamp(
            payment,
            &["transaction_time", "processed_at", "created_at", "timestamp", "occurredAt"],
        )
        .ok_or_else(|| malformed(Provider::Glofox, "missing payment timestamp"))?;

        let amount_minor = extract_amount_minor(payment);

        let email = normalize_email(pluck_str(
            payment,
            &["member_email", "email", "customerEmail"],
        ));
        let phone = normalize_phone(pluck_str(
            payment,
            &["member_phone", "phone", "customerPhone"],
        ));
        let person_name = pluck_str(payment, &["member_name", "customerName", "name"])
            .map(str::to_string);
        let member_id = pluck_str(payment, &["member_id", "memberId"]).map(str::to_string);
        let crm_contact_id =
            pluck_str(payment, &["ghlContactId", "contactId"]).map(str::to_string);

        let native_id = pluck_str(
            payment,
            &["payment_id", "paymentId", "externalPaymentId", "id", "sale_id", "transactionId"],
        );
        let external_id = match native_id {
            Some(id) => format!("glofox_{id}"),
            // No native id: derive a stable one from payload content so
            // re-importing the same CSV row or webhook yields one record.
            None => {
                let signal = email
                    .as_deref()
                    .or(person_name.as_deref())
                    .or(member_id.as_deref())
                    .ok_or_else(|| {
                        malformed(Provider::Glofox, "no payment id and no identity signal")
                    })?;
                synthesize_external_id(Provider::Glofox, signal, amount_minor, occurred_at)
            }
        };

        let status_text = pluck_str(payment, &["payment_status", "status"])
            .unwrap_or("")
            .to_lowercase();
        let status = match status_text.as_str() {
            "paid" | "completed" => TxnStatus::Settled,
            "failed" => TxnStatus::Failed,
            _ => TxnStatus::NeedsReview,
        };

        let product_label = pluck_str(
            payment,
            &["membership_name", "plan_name", "product_name", "product", "payment_type"],
        )
        .map(str::to_string);

        Ok(CanonicalTransaction {
            txn_id: Uuid::new_v4().to_string(),
            provider: Provider::Glofox,
            external_id,
            amount_minor,
            currency: currency_or(payment, &["currency"], "GBP"),
            occurred_at,
            status,
            confidence: if status == TxnStatus::Settled {
                Confidence::High
            } else {
                Confidence::NeedsReview
            },
            person_name: person_name.clone(),
            reference: pluck_str(payment, &["reference"]).map(str::to_string),
            product_label,
            product_category: Category::Unknown,
            signals: IdentitySignals {
                email,
                phone,
                full_name: person_name,
                crm_contact_id,
                member_id,
                processor_customer_id: None,
            },
            identity_id: None,
            raw_payload: raw.clone(),
        })
    }
}

/// Glofox reports either minor units (`amount_cents`) or major units
/// (`amount`, `total`), sometimes as strings. Major units scale by 100.
fn extract_amount_minor(payment: &Value) -> i64 {
    if let Some(minor) = payment
        .get("amount_cents")
        .or_else(|| payment.get("amountCents"))
        .and_then(Value::as_i64)
    {
        return minor;
    }
    for key in ["amount", "total", "value"] {
        match payment.get(key) {
            Some(Value::Number(n)) => {
                if let Some(f) = n.as_f64() {
                    return (f * 100.0).round() as i64;
                }
            }
            Some(Value::String(s)) => {
                if let Ok(f) = s.trim().parse::<f64>() {
                    // "45.00" is major units; "4500" is already minor.
                    return if s.contains('.') {
                        (f * 100.0).round() as i64
                    } else {
                        f.round() as i64
                    };
                }
            }
            _ => {}
        }
    }
    0
}

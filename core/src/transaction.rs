//! The canonical transaction model — one payment or financial event from
//! any provider, in a single shape.

use crate::classify::Category;
use crate::types::{EntityId, MinorUnits};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source systems the engine ingests from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Stripe,
    Glofox,
    Starling,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::Glofox => "glofox",
            Provider::Starling => "starling",
        }
    }

    pub fn parse(tag: &str) -> Option<Provider> {
        match tag.to_lowercase().as_str() {
            "stripe" => Some(Provider::Stripe),
            "glofox" => Some(Provider::Glofox),
            "starling" => Some(Provider::Starling),
            _ => None,
        }
    }

    /// Bank-feed providers carry no structured identity signals, only a
    /// free-text counterparty label. They are the reason the
    /// counterparty mapping table exists.
    pub fn is_bank_feed(&self) -> bool {
        matches!(self, Provider::Starling)
    }
}

/// Transaction lifecycle status. Each provider's success vocabulary
/// (succeeded / paid / completed / SETTLED) folds into `Settled` at
/// normalization time; the aggregator never re-interprets provider text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnStatus {
    Pending,
    Settled,
    Failed,
    NeedsReview,
}

impl TxnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnStatus::Pending => "pending",
            TxnStatus::Settled => "settled",
            TxnStatus::Failed => "failed",
            TxnStatus::NeedsReview => "needs_review",
        }
    }

    pub fn parse(s: &str) -> TxnStatus {
        match s {
            "pending" => TxnStatus::Pending,
            "settled" => TxnStatus::Settled,
            "failed" => TxnStatus::Failed,
            _ => TxnStatus::NeedsReview,
        }
    }

    /// The explicit money-received set. Failures and pending items are
    /// stored for audit but never contribute to LTV.
    pub fn counts_toward_ltv(&self) -> bool {
        matches!(self, TxnStatus::Settled)
    }
}

/// How confident the pipeline currently is in the transaction's
/// identity attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Matched,
    NeedsReview,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Matched => "matched",
            Confidence::NeedsReview => "needs_review",
        }
    }

    pub fn parse(s: &str) -> Confidence {
        match s {
            "high" => Confidence::High,
            "matched" => Confidence::Matched,
            _ => Confidence::NeedsReview,
        }
    }
}

/// Best-effort identity signals extracted by a normalizer. All fields
/// are already normalized (email lowercased, phone digits-only).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentitySignals {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub full_name: Option<String>,
    pub crm_contact_id: Option<String>,
    pub member_id: Option<String>,
    pub processor_customer_id: Option<String>,
}

impl IdentitySignals {
    /// True when the only usable signal is free text (name/label) —
    /// the case that feeds the counterparty mapping table.
    pub fn has_structured_signal(&self) -> bool {
        self.email.is_some()
            || self.phone.is_some()
            || self.crm_contact_id.is_some()
            || self.member_id.is_some()
            || self.processor_customer_id.is_some()
    }
}

/// One payment or financial event from any source, normalized.
/// `(provider, external_id)` is unique: at most one stored record per
/// real-world event, even under repeated delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTransaction {
    pub txn_id: EntityId,
    pub provider: Provider,
    pub external_id: String,
    pub amount_minor: MinorUnits,
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
    pub status: TxnStatus,
    pub confidence: Confidence,
    pub person_name: Option<String>,
    pub reference: Option<String>,
    pub product_label: Option<String>,
    pub product_category: Category,
    pub signals: IdentitySignals,
    pub identity_id: Option<EntityId>,
    pub raw_payload: serde_json::Value,
}

impl CanonicalTransaction {
    /// The free-text label a bank transaction is known by — counterparty
    /// name first, payment reference as fallback.
    pub fn counterparty_label(&self) -> Option<&str> {
        self.person_name
            .as_deref()
            .or(self.reference.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Synthesize a deterministic external id when a provider payload has no
/// native one. Re-processing the same payload must yield the same id, so
/// the id is built only from payload content.
pub fn synthesize_external_id(
    provider: Provider,
    signal: &str,
    amount_minor: MinorUnits,
    occurred_at: DateTime<Utc>,
) -> String {
    let slug: String = signal
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!(
        "{}_synth_{}_{}_{}",
        provider.as_str(),
        slug,
        amount_minor,
        occurred_at.timestamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn synthesized_id_is_deterministic() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let a = synthesize_external_id(Provider::Starling, "J Smith", 120_000, ts);
        let b = synthesize_external_id(Provider::Starling, "J Smith", 120_000, ts);
        assert_eq!(a, b);
        assert_eq!(a, "starling_synth_j-smith_120000_1740830400");
    }

    #[test]
    fn only_settled_counts_toward_ltv() {
        assert!(TxnStatus::Settled.counts_toward_ltv());
        assert!(!TxnStatus::Pending.counts_toward_ltv());
        assert!(!TxnStatus::Failed.counts_toward_ltv());
        assert!(!TxnStatus::NeedsReview.counts_toward_ltv());
    }
}

//! Identity matching engine.
//!
//! Fixed tier order, first hit wins:
//!   1. exact external-system id (CRM contact, member, processor customer)
//!   2. exact email (case-insensitive)
//!   3. exact normalized phone (digits only)
//!   4. learned counterparty mapping (bank-feed free text)
//!   5. exact full-name equality against exactly one candidate
//!
//! Tier 5 deliberately requires full equality, not substring containment:
//! "contains" matching cross-matches unrelated people. Zero or several
//! equally good candidates yield Unmatched — ambiguity is never resolved
//! by guessing.

use crate::error::EngineResult;
use crate::normalize::{counterparty_key, normalize_name};
use crate::store::Store;
use crate::transaction::CanonicalTransaction;
use crate::types::EntityId;
use serde::{Deserialize, Serialize};

/// Which tier produced a match. Ordering is the confidence ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    ExternalId,
    Email,
    Phone,
    CounterpartyMapping,
    ExactName,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::ExternalId => "external_id",
            MatchTier::Email => "email",
            MatchTier::Phone => "phone",
            MatchTier::CounterpartyMapping => "counterparty_mapping",
            MatchTier::ExactName => "exact_name",
        }
    }
}

/// Why a transaction could not be confidently attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// Only free text available and no mapping learned yet.
    NoStructuredIdentifier,
    /// Structured signals present but nothing in the identity table hit.
    NoMatch,
    /// More than one identity shares the exact normalized name.
    AmbiguousName,
}

impl UnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedReason::NoStructuredIdentifier => "no_structured_identifier",
            UnmatchedReason::NoMatch => "no_match",
            UnmatchedReason::AmbiguousName => "ambiguous_name",
        }
    }
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched {
        identity_id: EntityId,
        tier: MatchTier,
    },
    Unmatched {
        reason: UnmatchedReason,
        /// Identity suggestions for the manual queue (ambiguous names).
        candidates: Vec<EntityId>,
    },
}

/// Run the tiers against the store. Read-only: attachment and its side
/// effects belong to the engine's attach path.
pub fn find_match(store: &Store, txn: &CanonicalTransaction) -> EngineResult<MatchOutcome> {
    let signals = &txn.signals;

    // Tier 1: exact external-system identity.
    if let Some(identity) = store.find_identity_by_external_id(
        signals.crm_contact_id.as_deref(),
        signals.member_id.as_deref(),
        signals.processor_customer_id.as_deref(),
    )? {
        return Ok(matched(identity.identity_id, MatchTier::ExternalId));
    }

    // Tier 2: exact email. Both sides stored lowercased.
    if let Some(email) = signals.email.as_deref() {
        if let Some(identity) = store.find_identity_by_email(email)? {
            return Ok(matched(identity.identity_id, MatchTier::Email));
        }
    }

    retry_match(store, txn)
}

/// Tiers 3–5 only — the subset a bulk-retry pass re-runs over open
/// queue items, where newly learned mappings or newly created
/// identities may now produce a confident match.
pub fn retry_match(store: &Store, txn: &CanonicalTransaction) -> EngineResult<MatchOutcome> {
    let signals = &txn.signals;

    // Tier 3: exact normalized phone.
    if let Some(phone) = signals.phone.as_deref() {
        if let Some(identity) = store.find_identity_by_phone(phone)? {
            return Ok(matched(identity.identity_id, MatchTier::Phone));
        }
    }

    // Tier 4: learned counterparty mapping, keyed on the raw label.
    if let Some(key) = txn.counterparty_label().and_then(counterparty_key) {
        if let Some(mapping) = store.lookup_counterparty(txn.provider, &key)? {
            return Ok(matched(mapping.identity_id, MatchTier::CounterpartyMapping));
        }
    }

    // Tier 5: exact full-name equality, against exactly one candidate.
    // Attempted only for transactions with no structured identifier at
    // all — a mismatched email is a reason to queue, not to fall back
    // onto name guessing.
    if !signals.has_structured_signal() {
        if let Some(name_key) = normalize_name(signals.full_name.as_deref()) {
            let candidates = store.identities_by_name_key(&name_key)?;
            match candidates.len() {
                0 => {}
                1 => {
                    return Ok(matched(
                        candidates[0].identity_id.clone(),
                        MatchTier::ExactName,
                    ))
                }
                _ => {
                    return Ok(MatchOutcome::Unmatched {
                        reason: UnmatchedReason::AmbiguousName,
                        candidates: candidates.into_iter().map(|c| c.identity_id).collect(),
                    })
                }
            }
        }
    }

    let reason = if signals.has_structured_signal() {
        UnmatchedReason::NoMatch
    } else {
        UnmatchedReason::NoStructuredIdentifier
    };
    Ok(MatchOutcome::Unmatched {
        reason,
        candidates: Vec::new(),
    })
}

fn matched(identity_id: EntityId, tier: MatchTier) -> MatchOutcome {
    MatchOutcome::Matched { identity_id, tier }
}

//! LTV & attribution aggregator.
//!
//! Totals on an identity are derived, recomputable state: a pure
//! function of the currently attached transaction set. Nothing else
//! writes them, so the ledger and the displayed totals cannot drift —
//! a backfill or correction is repaired by running recompute again.

use crate::classify::Category;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::Store;
use crate::types::{EntityId, MinorUnits};
use std::collections::BTreeMap;

/// Snapshot of an identity's totals after a recompute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LtvSummary {
    pub identity_id: EntityId,
    pub all_minor: MinorUnits,
    pub paid_minor: MinorUnits,
    pub is_paid_channel: bool,
    pub categories: Vec<(Category, MinorUnits)>,
}

/// Recompute one identity's totals from its attached transactions and
/// persist them, all inside one store transaction.
///
/// Only settled transactions with a non-zero amount contribute. The
/// paid-channel total is all-or-nothing per identity: the entire
/// lifetime value is credited to paid acquisition iff the identity's
/// channel classifies as paid.
pub fn recompute(
    store: &Store,
    config: &EngineConfig,
    identity_id: &str,
) -> EngineResult<LtvSummary> {
    let tx = store.begin()?;
    let summary = recompute_within(store, config, identity_id)?;
    tx.commit()?;
    Ok(summary)
}

/// Recompute without opening a transaction — for callers (the attach
/// path) that already hold one. SQLite transactions do not nest.
pub(crate) fn recompute_within(
    store: &Store,
    config: &EngineConfig,
    identity_id: &str,
) -> EngineResult<LtvSummary> {
    let identity = store
        .get_identity(identity_id)?
        .ok_or_else(|| EngineError::IdentityNotFound(identity_id.to_string()))?;

    let mut all_minor: MinorUnits = 0;
    let mut buckets: BTreeMap<&'static str, (Category, MinorUnits)> = BTreeMap::new();

    for txn in store.txns_for_identity(identity_id)? {
        if !txn.status.counts_toward_ltv() || txn.amount_minor == 0 {
            continue;
        }
        all_minor += txn.amount_minor;
        if txn.product_category != Category::Unknown {
            buckets
                .entry(txn.product_category.as_str())
                .or_insert((txn.product_category, 0))
                .1 += txn.amount_minor;
        }
    }

    let is_paid_channel =
        config.is_paid_channel(identity.channel.as_deref(), &identity.tags);
    let paid_minor = if is_paid_channel { all_minor } else { 0 };
    let categories: Vec<(Category, MinorUnits)> = buckets.into_values().collect();

    check_invariants(identity_id, all_minor, paid_minor, &categories)?;
    store.write_ltv_totals(identity_id, all_minor, paid_minor, &categories)?;

    Ok(LtvSummary {
        identity_id: identity_id.to_string(),
        all_minor,
        paid_minor,
        is_paid_channel,
        categories,
    })
}

/// Recompute every identity in bounded, independently committed chunks.
/// A partial run leaves no inconsistency: each identity's totals are
/// written atomically and the pass is safely re-runnable from scratch.
pub fn recompute_all(store: &Store, config: &EngineConfig) -> EngineResult<usize> {
    let chunk = config.recompute_chunk_size.max(1);
    let mut cursor: Option<String> = None;
    let mut processed = 0usize;

    loop {
        let ids = store.identity_ids_after(cursor.as_deref(), chunk)?;
        let Some(last) = ids.last().cloned() else {
            break;
        };
        for identity_id in &ids {
            recompute(store, config, identity_id)?;
            processed += 1;
        }
        log::debug!("ltv recompute: {processed} identities processed");
        cursor = Some(last);
    }

    Ok(processed)
}

/// The aggregate invariants: category totals sum to at most the
/// all-channel total, and the paid total is either zero or the whole
/// total. Violation is a defect, surfaced loudly rather than stored.
fn check_invariants(
    identity_id: &str,
    all_minor: MinorUnits,
    paid_minor: MinorUnits,
    categories: &[(Category, MinorUnits)],
) -> EngineResult<()> {
    let category_sum: MinorUnits = categories.iter().map(|(_, v)| v).sum();
    if category_sum > all_minor {
        return Err(EngineError::AggregateInvariant {
            identity_id: identity_id.to_string(),
            detail: format!("category sum {category_sum} exceeds all-channel total {all_minor}"),
        });
    }
    if paid_minor != 0 && paid_minor != all_minor {
        return Err(EngineError::AggregateInvariant {
            identity_id: identity_id.to_string(),
            detail: format!("paid total {paid_minor} is neither 0 nor {all_minor}"),
        });
    }
    Ok(())
}

//! Manual match queue — the operator-facing surface for "we need your
//! help". Types here are views and reports; the operations live on the
//! engine so resolution shares the same attach path as automatic
//! matching.

use crate::store::QueueItemRow;
use crate::transaction::CanonicalTransaction;
use serde::Serialize;

/// Who (or what) closed a queue item.
pub mod resolver {
    /// A bulk-retry pass found a learned counterparty mapping.
    pub const AUTO_MAPPING: &str = "auto-mapping";
    /// A bulk-retry pass found a structured or exact-name match.
    pub const BULK_RETRY: &str = "bulk-retry";
    /// An operator confirmed the transaction cannot be matched.
    pub const CONFIRMED_UNMATCHABLE: &str = "confirmed-unmatchable";
}

/// An open queue item joined with its transaction, as listed to
/// operators.
#[derive(Debug, Clone)]
pub struct QueueItemView {
    pub item: QueueItemRow,
    pub txn: CanonicalTransaction,
}

/// Outcome counts of a bulk-retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkRetryReport {
    /// Closed via tiers 3–5 (structured signal or exact name).
    pub matched: usize,
    /// Closed via a learned counterparty mapping.
    pub auto_mapped: usize,
    /// Still open after the pass.
    pub failed: usize,
}

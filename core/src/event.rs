//! Audit events — every state transition the engine performs, appended
//! to the event log for operational visibility and replay debugging.

use crate::types::{EntityId, MinorUnits};
use serde::{Deserialize, Serialize};

/// Variants are added as the pipeline grows — never removed or renamed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    PaymentStored {
        txn_id: EntityId,
        provider: String,
        external_id: String,
        amount_minor: MinorUnits,
    },
    DuplicateDelivery {
        provider: String,
        external_id: String,
    },
    TransactionMatched {
        txn_id: EntityId,
        identity_id: EntityId,
        tier: String,
    },
    TransactionQueued {
        txn_id: EntityId,
        reason: String,
    },
    QueueItemResolved {
        queue_id: EntityId,
        txn_id: EntityId,
        identity_id: Option<EntityId>,
        resolved_by: String,
    },
    MappingLearned {
        provider: String,
        label_key: String,
        identity_id: EntityId,
    },
    LtvRecomputed {
        identity_id: EntityId,
        all_minor: MinorUnits,
        paid_minor: MinorUnits,
    },
    AdsAttributionRecorded {
        txn_id: EntityId,
        identity_id: EntityId,
        amount_minor: MinorUnits,
    },
    LeadCaptured {
        identity_id: EntityId,
        channel: Option<String>,
    },
    TransactionDetached {
        txn_id: EntityId,
        identity_id: EntityId,
    },
}

impl EngineEvent {
    /// Stable string name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            EngineEvent::PaymentStored { .. } => "payment_stored",
            EngineEvent::DuplicateDelivery { .. } => "duplicate_delivery",
            EngineEvent::TransactionMatched { .. } => "transaction_matched",
            EngineEvent::TransactionQueued { .. } => "transaction_queued",
            EngineEvent::QueueItemResolved { .. } => "queue_item_resolved",
            EngineEvent::MappingLearned { .. } => "mapping_learned",
            EngineEvent::LtvRecomputed { .. } => "ltv_recomputed",
            EngineEvent::AdsAttributionRecorded { .. } => "ads_attribution_recorded",
            EngineEvent::LeadCaptured { .. } => "lead_captured",
            EngineEvent::TransactionDetached { .. } => "transaction_detached",
        }
    }
}

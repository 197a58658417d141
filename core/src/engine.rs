//! The engine facade. Owns the store and the configuration, and is the
//! only place pipeline stages are wired together: normalize → upsert →
//! match → attach-or-queue, plus the operator surfaces (queue
//! resolution, bulk retry, recompute, detach).
//!
//! Every path that mutates more than one table runs inside a single
//! store transaction, so observers never see a transaction attached
//! without its identity's totals updated.

use crate::classify::classify;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::EngineEvent;
use crate::intake::normalize_lead;
use crate::ltv::{self, LtvSummary};
use crate::matching::{self, MatchOutcome, MatchTier};
use crate::normalize::{counterparty_key, normalize_email, normalize_phone};
use crate::providers::normalizer_for;
use crate::queue::{resolver, BulkRetryReport, QueueItemView};
use crate::store::{AdsAttributionRow, IdentityRow, QueueItemRow, Store, UpsertOutcome};
use crate::transaction::{CanonicalTransaction, Confidence, Provider, TxnStatus};
use crate::types::EntityId;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

/// What happened to one ingested payload.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub txn_id: EntityId,
    pub external_id: String,
    pub outcome: UpsertOutcome,
    /// Attached to an identity (now or on a previous delivery).
    pub matched: bool,
    /// Sitting in the manual queue.
    pub queued: bool,
}

/// Operator-created identity, outside the lead-intake path.
#[derive(Debug, Clone, Default)]
pub struct NewIdentity {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub channel: Option<String>,
    pub tags: Vec<String>,
}

pub struct Engine {
    pub store: Store,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Store, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Open (and migrate) a database file.
    pub fn open(path: &str, config: EngineConfig) -> EngineResult<Self> {
        let store = Store::open(path)?;
        store.migrate()?;
        Ok(Self::new(store, config))
    }

    /// In-memory engine with the default configuration (tests).
    pub fn in_memory() -> EngineResult<Self> {
        let store = Store::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, EngineConfig::default()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Ingestion ──────────────────────────────────────────────

    /// Ingest one raw provider payload end to end: normalize, store
    /// idempotently, then match and attach — or queue for manual review.
    pub fn ingest(&self, provider: Provider, raw: &Value) -> EngineResult<IngestResult> {
        let mut txn = normalizer_for(provider).normalize(raw)?;
        txn.product_category =
            classify(&self.config.category_keywords(), txn.product_label.as_deref());

        let outcome = self.store.upsert_txn(&txn)?;
        // Re-read: on redelivery the stored row (with its attachment and
        // merged fields) is authoritative, not the fresh normalization.
        let stored = self
            .store
            .get_txn_by_external(provider, &txn.external_id)?
            .ok_or_else(|| EngineError::TransactionNotFound(txn.external_id.clone()))?;

        match outcome {
            UpsertOutcome::Created => {
                self.store.append_event(
                    "ingest",
                    &EngineEvent::PaymentStored {
                        txn_id: stored.txn_id.clone(),
                        provider: provider.as_str().to_string(),
                        external_id: stored.external_id.clone(),
                        amount_minor: stored.amount_minor,
                    },
                )?;
            }
            _ => {
                log::debug!(
                    "duplicate delivery: {} {} ({})",
                    provider.as_str(),
                    stored.external_id,
                    outcome.as_str()
                );
                self.store.append_event(
                    "ingest",
                    &EngineEvent::DuplicateDelivery {
                        provider: provider.as_str().to_string(),
                        external_id: stored.external_id.clone(),
                    },
                )?;
            }
        }

        let mut matched = stored.identity_id.is_some();
        let mut queued = false;

        if let Some(identity_id) = stored.identity_id.clone() {
            if outcome == UpsertOutcome::Updated {
                self.settle_attached(&stored, &identity_id)?;
            }
        } else if self
            .store
            .txn_resolved_by(&stored.txn_id, resolver::CONFIRMED_UNMATCHABLE)?
        {
            // The operator's decision is terminal; redelivery must not
            // reopen work for it.
            log::debug!(
                "transaction {} is confirmed unmatchable, skipping match",
                stored.txn_id
            );
        } else {
            match matching::find_match(&self.store, &stored)? {
                MatchOutcome::Matched { identity_id, tier } => {
                    self.attach(&stored, &identity_id, tier.as_str())?;
                    matched = true;
                }
                MatchOutcome::Unmatched { reason, candidates } => {
                    let item = QueueItemRow {
                        queue_id: Uuid::new_v4().to_string(),
                        txn_id: stored.txn_id.clone(),
                        reason: reason.as_str().to_string(),
                        candidates,
                        created_at: Utc::now(),
                        resolved_at: None,
                        resolved_by: None,
                    };
                    if self.store.enqueue_unmatched(&item)? {
                        self.store.append_event(
                            "ingest",
                            &EngineEvent::TransactionQueued {
                                txn_id: stored.txn_id.clone(),
                                reason: item.reason.clone(),
                            },
                        )?;
                    }
                    queued = true;
                }
            }
        }

        Ok(IngestResult {
            txn_id: stored.txn_id,
            external_id: stored.external_id,
            outcome,
            matched,
            queued,
        })
    }

    // ── Attachment ─────────────────────────────────────────────

    /// Status change on an already-attached transaction: recompute the
    /// totals and, when the payment has now settled for a paid-channel
    /// identity, record the conversion the attach-time gate skipped.
    fn settle_attached(
        &self,
        txn: &CanonicalTransaction,
        identity_id: &EntityId,
    ) -> EngineResult<()> {
        let tx = self.store.begin()?;
        let summary = ltv::recompute_within(&self.store, &self.config, identity_id)?;
        if summary.is_paid_channel && txn.status.counts_toward_ltv() {
            let recorded = self.store.record_ads_attribution(&AdsAttributionRow {
                txn_id: txn.txn_id.clone(),
                identity_id: identity_id.clone(),
                amount_minor: txn.amount_minor,
                occurred_at: txn.occurred_at,
            })?;
            if recorded {
                self.store.append_event(
                    "ltv",
                    &EngineEvent::AdsAttributionRecorded {
                        txn_id: txn.txn_id.clone(),
                        identity_id: identity_id.clone(),
                        amount_minor: txn.amount_minor,
                    },
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn attach(
        &self,
        txn: &CanonicalTransaction,
        identity_id: &EntityId,
        via: &str,
    ) -> EngineResult<LtvSummary> {
        let tx = self.store.begin()?;
        let summary = self.attach_within(txn, identity_id, via)?;
        tx.commit()?;
        Ok(summary)
    }

    /// The one attach path, shared by automatic matching, manual
    /// resolution and bulk retry. Caller holds the transaction.
    fn attach_within(
        &self,
        txn: &CanonicalTransaction,
        identity_id: &EntityId,
        via: &str,
    ) -> EngineResult<LtvSummary> {
        // Review-pending means "unidentified", not "unpaid": attachment
        // is what settles it.
        let status = if txn.status == TxnStatus::NeedsReview {
            TxnStatus::Settled
        } else {
            txn.status
        };
        self.store
            .set_txn_identity(&txn.txn_id, identity_id, status, Confidence::Matched)?;
        self.store.mark_identity_client(identity_id)?;
        self.store.append_event(
            "matching",
            &EngineEvent::TransactionMatched {
                txn_id: txn.txn_id.clone(),
                identity_id: identity_id.clone(),
                tier: via.to_string(),
            },
        )?;

        let summary = ltv::recompute_within(&self.store, &self.config, identity_id)?;
        self.store.append_event(
            "ltv",
            &EngineEvent::LtvRecomputed {
                identity_id: identity_id.clone(),
                all_minor: summary.all_minor,
                paid_minor: summary.paid_minor,
            },
        )?;

        if summary.is_paid_channel && status.counts_toward_ltv() {
            let recorded = self.store.record_ads_attribution(&AdsAttributionRow {
                txn_id: txn.txn_id.clone(),
                identity_id: identity_id.clone(),
                amount_minor: txn.amount_minor,
                occurred_at: txn.occurred_at,
            })?;
            if recorded {
                self.store.append_event(
                    "ltv",
                    &EngineEvent::AdsAttributionRecorded {
                        txn_id: txn.txn_id.clone(),
                        identity_id: identity_id.clone(),
                        amount_minor: txn.amount_minor,
                    },
                )?;
            }
        }

        Ok(summary)
    }

    /// Correction path: detach a transaction and restore the identity's
    /// totals to what they would be had it never been attached. The ads
    /// ledger row, if any, stays: the ledger is append-only history.
    pub fn detach_transaction(&self, txn_id: &str) -> EngineResult<()> {
        let txn = self
            .store
            .get_txn(txn_id)?
            .ok_or_else(|| EngineError::TransactionNotFound(txn_id.to_string()))?;
        let Some(identity_id) = txn.identity_id else {
            return Ok(());
        };

        let tx = self.store.begin()?;
        self.store.clear_txn_identity(txn_id)?;
        ltv::recompute_within(&self.store, &self.config, &identity_id)?;
        self.store.append_event(
            "matching",
            &EngineEvent::TransactionDetached {
                txn_id: txn_id.to_string(),
                identity_id,
            },
        )?;
        tx.commit()?;
        Ok(())
    }

    // ── Identities ─────────────────────────────────────────────

    /// Ingest a lead-capture payload: create the identity, or merge into
    /// the one already known by CRM contact id or email.
    pub fn intake_lead(&self, raw: &Value) -> EngineResult<EntityId> {
        let lead = normalize_lead(raw)?;

        let mut existing = match lead.crm_contact_id.as_deref() {
            Some(id) => self.store.find_identity_by_external_id(Some(id), None, None)?,
            None => None,
        };
        if existing.is_none() {
            if let Some(email) = lead.email.as_deref() {
                existing = self.store.find_identity_by_email(email)?;
            }
        }

        let row = IdentityRow {
            identity_id: existing
                .as_ref()
                .map(|r| r.identity_id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            display_name: lead.display_name(),
            channel: lead.source.clone(),
            tags: lead.tags.clone(),
            crm_contact_id: lead.crm_contact_id.clone(),
            ..IdentityRow::default()
        };

        if existing.is_some() {
            self.store.merge_identity(&row)?;
            log::debug!("lead merged into identity {}", row.identity_id);
        } else {
            self.store.insert_identity(&row)?;
            self.store.append_event(
                "intake",
                &EngineEvent::LeadCaptured {
                    identity_id: row.identity_id.clone(),
                    channel: row.channel.clone(),
                },
            )?;
        }
        Ok(row.identity_id)
    }

    /// Operator-created identity, typically made while resolving a queue
    /// item for a customer who never came through a lead form.
    pub fn create_identity(&self, new: NewIdentity) -> EngineResult<EntityId> {
        let row = IdentityRow {
            identity_id: Uuid::new_v4().to_string(),
            email: normalize_email(new.email.as_deref()),
            phone: normalize_phone(new.phone.as_deref()),
            display_name: new.display_name,
            channel: new.channel,
            tags: new.tags,
            ..IdentityRow::default()
        };
        self.store.insert_identity(&row)?;
        self.store.append_event(
            "intake",
            &EngineEvent::LeadCaptured {
                identity_id: row.identity_id.clone(),
                channel: row.channel.clone(),
            },
        )?;
        Ok(row.identity_id)
    }

    // ── Manual queue ───────────────────────────────────────────

    /// Open queue items joined with their transactions, oldest first.
    pub fn open_queue_items(
        &self,
        provider: Option<Provider>,
    ) -> EngineResult<Vec<QueueItemView>> {
        let mut views = Vec::new();
        for item in self.store.open_queue_items(provider)? {
            let txn = self
                .store
                .get_txn(&item.txn_id)?
                .ok_or_else(|| EngineError::TransactionNotFound(item.txn_id.clone()))?;
            views.push(QueueItemView { item, txn });
        }
        Ok(views)
    }

    /// Resolve one queue item: attach its transaction to `identity_id`,
    /// or close it as confirmed-unmatchable when `None` — that
    /// provenance is recorded regardless of the caller's `resolved_by`,
    /// since the bulk-retry and redelivery paths key off it.
    ///
    /// When the attached transaction's only signal was a free-text
    /// counterparty label, the resolution is also learned as a mapping,
    /// so the next payment from that counterparty matches automatically.
    pub fn resolve_queue_item(
        &self,
        queue_id: &str,
        identity_id: Option<&str>,
        resolved_by: &str,
    ) -> EngineResult<()> {
        let item = self
            .store
            .get_queue_item(queue_id)?
            .ok_or_else(|| EngineError::QueueItemNotFound(queue_id.to_string()))?;
        if !item.is_open() {
            return Err(EngineError::QueueItemAlreadyResolved(queue_id.to_string()));
        }
        let txn = self
            .store
            .get_txn(&item.txn_id)?
            .ok_or_else(|| EngineError::TransactionNotFound(item.txn_id.clone()))?;

        let resolved_by = if identity_id.is_some() {
            resolved_by
        } else {
            resolver::CONFIRMED_UNMATCHABLE
        };

        let tx = self.store.begin()?;
        // Guarded close: if another resolver won the race since the read
        // above, nothing below runs and the rollback undoes nothing.
        if !self.store.close_queue_item(queue_id, resolved_by)? {
            return Err(EngineError::QueueItemAlreadyResolved(queue_id.to_string()));
        }

        if let Some(identity_id) = identity_id {
            let identity_id = identity_id.to_string();
            self.attach_within(&txn, &identity_id, "manual")?;

            if !txn.signals.has_structured_signal() {
                if let Some(key) = txn.counterparty_label().and_then(counterparty_key) {
                    self.store
                        .upsert_counterparty(txn.provider, &key, &identity_id)?;
                    self.store.append_event(
                        "queue",
                        &EngineEvent::MappingLearned {
                            provider: txn.provider.as_str().to_string(),
                            label_key: key,
                            identity_id: identity_id.clone(),
                        },
                    )?;
                }
            }
        }

        self.store.append_event(
            "queue",
            &EngineEvent::QueueItemResolved {
                queue_id: queue_id.to_string(),
                txn_id: txn.txn_id.clone(),
                identity_id: identity_id.map(str::to_string),
                resolved_by: resolved_by.to_string(),
            },
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Re-run the retryable matching tiers over every open queue item.
    /// Each item is attached and closed in its own transaction; closed
    /// items are history and are never reopened.
    pub fn bulk_retry(&self, provider: Option<Provider>) -> EngineResult<BulkRetryReport> {
        let mut report = BulkRetryReport::default();

        for item in self.store.open_queue_items(provider)? {
            let Some(txn) = self.store.get_txn(&item.txn_id)? else {
                report.failed += 1;
                continue;
            };
            match matching::retry_match(&self.store, &txn)? {
                MatchOutcome::Matched { identity_id, tier } => {
                    let resolved_by = if tier == MatchTier::CounterpartyMapping {
                        resolver::AUTO_MAPPING
                    } else {
                        resolver::BULK_RETRY
                    };
                    let tx = self.store.begin()?;
                    if !self.store.close_queue_item(&item.queue_id, resolved_by)? {
                        continue;
                    }
                    self.attach_within(&txn, &identity_id, tier.as_str())?;
                    self.store.append_event(
                        "queue",
                        &EngineEvent::QueueItemResolved {
                            queue_id: item.queue_id.clone(),
                            txn_id: txn.txn_id.clone(),
                            identity_id: Some(identity_id.clone()),
                            resolved_by: resolved_by.to_string(),
                        },
                    )?;
                    tx.commit()?;
                    if tier == MatchTier::CounterpartyMapping {
                        report.auto_mapped += 1;
                    } else {
                        report.matched += 1;
                    }
                }
                MatchOutcome::Unmatched { .. } => report.failed += 1,
            }
        }

        log::info!(
            "bulk retry: {} matched, {} auto-mapped, {} failed",
            report.matched,
            report.auto_mapped,
            report.failed
        );
        Ok(report)
    }

    // ── LTV ────────────────────────────────────────────────────

    pub fn recompute_ltv(&self, identity_id: &str) -> EngineResult<LtvSummary> {
        ltv::recompute(&self.store, &self.config, identity_id)
    }

    /// Recompute every identity. Returns the number processed.
    pub fn recompute_all_ltv(&self) -> EngineResult<usize> {
        ltv::recompute_all(&self.store, &self.config)
    }

    /// Read path: the stored totals, without recomputing.
    pub fn ltv_summary(&self, identity_id: &str) -> EngineResult<LtvSummary> {
        let identity = self
            .store
            .get_identity(identity_id)?
            .ok_or_else(|| EngineError::IdentityNotFound(identity_id.to_string()))?;
        Ok(LtvSummary {
            identity_id: identity.identity_id.clone(),
            all_minor: identity.ltv_all_minor,
            paid_minor: identity.ltv_paid_minor,
            is_paid_channel: self
                .config
                .is_paid_channel(identity.channel.as_deref(), &identity.tags),
            categories: self.store.ltv_categories(identity_id)?,
        })
    }
}

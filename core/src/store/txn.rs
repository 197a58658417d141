//! Canonical transaction persistence: the idempotent upsert and the
//! queries the matcher and aggregator run over stored transactions.

use super::{json_column, time_column, Store, UpsertOutcome};
use crate::classify::Category;
use crate::error::EngineResult;
use crate::transaction::{CanonicalTransaction, Confidence, Provider, TxnStatus};
use crate::types::EntityId;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

const TXN_COLUMNS: &str = "txn_id, provider, external_id, amount_minor, currency, occurred_at,
     status, confidence, person_name, reference, product_label,
     product_category, signals, identity_id, raw_payload";

fn txn_from_row(row: &Row<'_>) -> rusqlite::Result<CanonicalTransaction> {
    let provider_text: String = row.get(1)?;
    let provider = Provider::parse(&provider_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown provider '{provider_text}'").into(),
        )
    })?;
    let status: String = row.get(6)?;
    let confidence: String = row.get(7)?;
    let category: String = row.get(11)?;
    Ok(CanonicalTransaction {
        txn_id: row.get(0)?,
        provider,
        external_id: row.get(2)?,
        amount_minor: row.get(3)?,
        currency: row.get(4)?,
        occurred_at: time_column(5, row.get(5)?)?,
        status: TxnStatus::parse(&status),
        confidence: Confidence::parse(&confidence),
        person_name: row.get(8)?,
        reference: row.get(9)?,
        product_label: row.get(10)?,
        product_category: Category::from_key(&category),
        signals: json_column(12, row.get(12)?)?,
        identity_id: row.get(13)?,
        raw_payload: json_column(14, row.get(14)?)?,
    })
}

impl Store {
    /// Idempotent upsert keyed on (provider, external_id).
    ///
    /// Absent → insert. Present → merge only the fields a later delivery
    /// authoritatively updates (status, confidence; other fields only
    /// fill gaps, never blank known values). The schema's unique
    /// constraint remains the guard under concurrent writers; the
    /// read-before-write here only classifies the outcome.
    pub fn upsert_txn(&self, txn: &CanonicalTransaction) -> EngineResult<UpsertOutcome> {
        let existing: Option<(String, String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT status, confidence, identity_id FROM txn
                 WHERE provider = ?1 AND external_id = ?2",
                params![txn.provider.as_str(), txn.external_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;

        let now = Utc::now().to_rfc3339();
        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO txn (txn_id, provider, external_id, amount_minor, currency,
                         occurred_at, status, confidence, person_name, reference,
                         product_label, product_category, signals, identity_id,
                         raw_payload, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?16)
                     ON CONFLICT(provider, external_id) DO UPDATE SET
                         status = excluded.status,
                         confidence = excluded.confidence,
                         updated_at = excluded.updated_at",
                    params![
                        txn.txn_id,
                        txn.provider.as_str(),
                        txn.external_id,
                        txn.amount_minor,
                        txn.currency,
                        txn.occurred_at.to_rfc3339(),
                        txn.status.as_str(),
                        txn.confidence.as_str(),
                        txn.person_name,
                        txn.reference,
                        txn.product_label,
                        txn.product_category.as_str(),
                        serde_json::to_string(&txn.signals)?,
                        txn.identity_id,
                        serde_json::to_string(&txn.raw_payload)?,
                        now,
                    ],
                )?;
                Ok(UpsertOutcome::Created)
            }
            // Once attached, the attachment's confidence is the truth;
            // a redelivered payload with the same status adds nothing.
            Some((status, confidence, identity_id))
                if status == txn.status.as_str()
                    && (identity_id.is_some() || confidence == txn.confidence.as_str()) =>
            {
                Ok(UpsertOutcome::Unchanged)
            }
            Some(_) => {
                self.conn.execute(
                    "UPDATE txn SET
                         status = ?3,
                         confidence = CASE WHEN identity_id IS NOT NULL
                                           THEN confidence ELSE ?4 END,
                         person_name = COALESCE(person_name, ?5),
                         reference = COALESCE(reference, ?6),
                         product_label = COALESCE(product_label, ?7),
                         updated_at = ?8
                     WHERE provider = ?1 AND external_id = ?2",
                    params![
                        txn.provider.as_str(),
                        txn.external_id,
                        txn.status.as_str(),
                        txn.confidence.as_str(),
                        txn.person_name,
                        txn.reference,
                        txn.product_label,
                        now,
                    ],
                )?;
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    pub fn get_txn(&self, txn_id: &str) -> EngineResult<Option<CanonicalTransaction>> {
        let sql = format!("SELECT {TXN_COLUMNS} FROM txn WHERE txn_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [txn_id], txn_from_row)
            .optional()?)
    }

    pub fn get_txn_by_external(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> EngineResult<Option<CanonicalTransaction>> {
        let sql =
            format!("SELECT {TXN_COLUMNS} FROM txn WHERE provider = ?1 AND external_id = ?2");
        Ok(self
            .conn
            .query_row(&sql, params![provider.as_str(), external_id], txn_from_row)
            .optional()?)
    }

    /// All transactions attached to an identity, oldest first. The
    /// aggregator filters by status itself so that the money-received
    /// set stays in one place.
    pub fn txns_for_identity(
        &self,
        identity_id: &str,
    ) -> EngineResult<Vec<CanonicalTransaction>> {
        let sql = format!(
            "SELECT {TXN_COLUMNS} FROM txn WHERE identity_id = ?1 ORDER BY occurred_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([identity_id], txn_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_txn_identity(
        &self,
        txn_id: &str,
        identity_id: &EntityId,
        status: TxnStatus,
        confidence: Confidence,
    ) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE txn SET identity_id = ?2, status = ?3, confidence = ?4, updated_at = ?5
             WHERE txn_id = ?1",
            params![
                txn_id,
                identity_id,
                status.as_str(),
                confidence.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Correction path: detach a transaction from its identity.
    pub fn clear_txn_identity(&self, txn_id: &str) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE txn SET identity_id = NULL, confidence = 'needs_review', updated_at = ?2
             WHERE txn_id = ?1",
            params![txn_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn txn_count(&self) -> EngineResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM txn", [], |r| r.get(0))?)
    }
}

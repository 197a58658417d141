//! Manual match queue persistence. Open items are live work; resolved
//! items are immutable history — the close is guarded so a concurrent
//! resolve and bulk retry cannot both claim the same item.

use super::{json_column, time_column, QueueItemRow, Store};
use crate::error::EngineResult;
use crate::transaction::Provider;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

const QUEUE_COLUMNS: &str =
    "queue_id, txn_id, reason, candidates, created_at, resolved_at, resolved_by";

fn queue_item_from_row(row: &Row<'_>) -> rusqlite::Result<QueueItemRow> {
    let resolved_at: Option<String> = row.get(5)?;
    Ok(QueueItemRow {
        queue_id: row.get(0)?,
        txn_id: row.get(1)?,
        reason: row.get(2)?,
        candidates: json_column(3, row.get(3)?)?,
        created_at: time_column(4, row.get(4)?)?,
        resolved_at: resolved_at.map(|t| time_column(5, t)).transpose()?,
        resolved_by: row.get(6)?,
    })
}

impl Store {
    /// Insert an open queue item for a transaction. The partial unique
    /// index on open items absorbs a duplicate enqueue (redelivery of a
    /// still-unmatched payment) as a no-op.
    pub fn enqueue_unmatched(&self, item: &QueueItemRow) -> EngineResult<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO match_queue (queue_id, txn_id, reason, candidates, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(txn_id) WHERE resolved_at IS NULL DO NOTHING",
            params![
                item.queue_id,
                item.txn_id,
                item.reason,
                serde_json::to_string(&item.candidates)?,
                item.created_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_queue_item(&self, queue_id: &str) -> EngineResult<Option<QueueItemRow>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM match_queue WHERE queue_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [queue_id], queue_item_from_row)
            .optional()?)
    }

    /// Open items, oldest first, optionally restricted to one provider.
    pub fn open_queue_items(
        &self,
        provider: Option<Provider>,
    ) -> EngineResult<Vec<QueueItemRow>> {
        let sql = "SELECT q.queue_id, q.txn_id, q.reason, q.candidates,
                    q.created_at, q.resolved_at, q.resolved_by
             FROM match_queue q
             JOIN txn t ON t.txn_id = q.txn_id
             WHERE q.resolved_at IS NULL AND (?1 = '' OR t.provider = ?1)
             ORDER BY q.created_at ASC";
        let tag = provider.map(|p| p.as_str()).unwrap_or("");
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([tag], queue_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Close an item iff it is still open. Returns false when another
    /// resolver got there first — the caller treats that as
    /// already-resolved, never as something to overwrite.
    pub fn close_queue_item(&self, queue_id: &str, resolved_by: &str) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "UPDATE match_queue SET resolved_at = ?2, resolved_by = ?3
             WHERE queue_id = ?1 AND resolved_at IS NULL",
            params![queue_id, Utc::now().to_rfc3339(), resolved_by],
        )?;
        Ok(changed > 0)
    }

    /// True when an already-resolved item for this transaction carries
    /// the given resolution provenance. Lets the ingest path honor a
    /// terminal operator decision across redeliveries.
    pub fn txn_resolved_by(&self, txn_id: &str, resolved_by: &str) -> EngineResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM match_queue
             WHERE txn_id = ?1 AND resolved_at IS NOT NULL AND resolved_by = ?2",
            params![txn_id, resolved_by],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn open_queue_count(&self) -> EngineResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM match_queue WHERE resolved_at IS NULL",
            [],
            |r| r.get(0),
        )?)
    }
}

//! Ads attribution ledger rows. One row per payment; re-recording is a
//! no-op by constraint, so replays and retries are safe.

use super::{time_column, AdsAttributionRow, Store};
use crate::error::EngineResult;
use chrono::Utc;
use rusqlite::params;

impl Store {
    /// Returns true when a new ledger row was written, false when the
    /// payment was already attributed.
    pub fn record_ads_attribution(&self, row: &AdsAttributionRow) -> EngineResult<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO ads_attribution (txn_id, identity_id, amount_minor, occurred_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(txn_id) DO NOTHING",
            params![
                row.txn_id,
                row.identity_id,
                row.amount_minor,
                row.occurred_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn ads_attributions_for_identity(
        &self,
        identity_id: &str,
    ) -> EngineResult<Vec<AdsAttributionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT txn_id, identity_id, amount_minor, occurred_at FROM ads_attribution
             WHERE identity_id = ?1 ORDER BY occurred_at ASC",
        )?;
        let rows = stmt
            .query_map([identity_id], |r| {
                Ok(AdsAttributionRow {
                    txn_id: r.get(0)?,
                    identity_id: r.get(1)?,
                    amount_minor: r.get(2)?,
                    occurred_at: time_column(3, r.get(3)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn ads_attribution_count(&self) -> EngineResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM ads_attribution", [], |r| r.get(0))?)
    }
}

//! Learned counterparty mappings: free-text bank labels to identities.
//! Read on every bank-feed match; written only by the resolution path.

use super::{CounterpartyMappingRow, Store};
use crate::error::EngineResult;
use crate::transaction::Provider;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

impl Store {
    pub fn lookup_counterparty(
        &self,
        provider: Provider,
        label_key: &str,
    ) -> EngineResult<Option<CounterpartyMappingRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT provider, label_key, identity_id FROM counterparty_map
                 WHERE provider = ?1 AND label_key = ?2",
                params![provider.as_str(), label_key],
                |r| {
                    Ok(CounterpartyMappingRow {
                        provider: r.get(0)?,
                        label_key: r.get(1)?,
                        identity_id: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    /// Learn (or explicitly replace) a mapping. A later resolution to a
    /// different identity overwrites through this path and nowhere else.
    pub fn upsert_counterparty(
        &self,
        provider: Provider,
        label_key: &str,
        identity_id: &str,
    ) -> EngineResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO counterparty_map (provider, label_key, identity_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(provider, label_key) DO UPDATE SET
                 identity_id = excluded.identity_id,
                 updated_at = excluded.updated_at",
            params![provider.as_str(), label_key, identity_id, now],
        )?;
        Ok(())
    }

    pub fn counterparty_count(&self) -> EngineResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM counterparty_map", [], |r| r.get(0))?)
    }
}

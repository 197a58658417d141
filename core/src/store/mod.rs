//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. Engine components call
//! store methods — they never execute SQL directly. Uniqueness
//! constraints in the schema, not application-level check-then-insert,
//! are what make duplicate delivery safe.

mod ads;
mod identity;
mod mapping;
mod queue;
mod txn;

use crate::error::EngineResult;
use crate::event::EngineEvent;
use crate::types::{EntityId, MinorUnits};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;

pub struct Store {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for a file
}

impl Store {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_identity.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_transactions.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_match_queue.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/005_ads_attribution.sql"))?;
        Ok(())
    }

    /// Begin an explicit transaction on the store's connection. Engine
    /// paths that must be atomic (match-and-attach, queue resolution)
    /// wrap their store calls in one of these; dropping without commit
    /// rolls back.
    pub fn begin(&self) -> EngineResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, source: &str, event: &EngineEvent) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (source, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                source,
                event.type_name(),
                serde_json::to_string(event)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn event_count(&self, event_type: &str) -> EngineResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            [event_type],
            |r| r.get(0),
        )?)
    }
}

/// Outcome of an idempotent upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Unchanged => "unchanged",
        }
    }
}

// ── Row types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct IdentityRow {
    pub identity_id: EntityId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub channel: Option<String>,
    pub tags: Vec<String>,
    pub crm_contact_id: Option<String>,
    pub member_id: Option<String>,
    pub processor_customer_id: Option<String>,
    pub is_client: bool,
    pub ltv_all_minor: MinorUnits,
    pub ltv_paid_minor: MinorUnits,
}

#[derive(Debug, Clone)]
pub struct QueueItemRow {
    pub queue_id: EntityId,
    pub txn_id: EntityId,
    pub reason: String,
    pub candidates: Vec<EntityId>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl QueueItemRow {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct CounterpartyMappingRow {
    pub provider: String,
    pub label_key: String,
    pub identity_id: EntityId,
}

#[derive(Debug, Clone)]
pub struct AdsAttributionRow {
    pub txn_id: EntityId,
    pub identity_id: EntityId,
    pub amount_minor: MinorUnits,
    pub occurred_at: DateTime<Utc>,
}

// ── Column conversion helpers ──────────────────────────────────────

/// Parse a JSON text column inside a rusqlite row-mapping closure.
pub(crate) fn json_column<T: DeserializeOwned>(
    idx: usize,
    text: String,
) -> rusqlite::Result<T> {
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn time_column(idx: usize, text: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

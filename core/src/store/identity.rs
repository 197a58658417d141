//! Customer identity persistence: lookups for each matching tier and
//! the derived-LTV writes owned by the aggregator.

use super::{json_column, IdentityRow, Store};
use crate::classify::Category;
use crate::error::EngineResult;
use crate::normalize::normalize_name;
use crate::types::MinorUnits;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

const IDENTITY_COLUMNS: &str = "identity_id, email, phone, display_name, channel, tags,
     crm_contact_id, member_id, processor_customer_id, is_client,
     ltv_all_minor, ltv_paid_minor";

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<IdentityRow> {
    Ok(IdentityRow {
        identity_id: row.get(0)?,
        email: row.get(1)?,
        phone: row.get(2)?,
        display_name: row.get(3)?,
        channel: row.get(4)?,
        tags: json_column(5, row.get(5)?)?,
        crm_contact_id: row.get(6)?,
        member_id: row.get(7)?,
        processor_customer_id: row.get(8)?,
        is_client: row.get::<_, i64>(9)? != 0,
        ltv_all_minor: row.get(10)?,
        ltv_paid_minor: row.get(11)?,
    })
}

impl Store {
    pub fn insert_identity(&self, row: &IdentityRow) -> EngineResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO identity (identity_id, email, phone, display_name, name_key,
                 channel, tags, crm_contact_id, member_id, processor_customer_id,
                 is_client, ltv_all_minor, ltv_paid_minor, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?14)",
            params![
                row.identity_id,
                row.email,
                row.phone,
                row.display_name,
                normalize_name(row.display_name.as_deref()),
                row.channel,
                serde_json::to_string(&row.tags)?,
                row.crm_contact_id,
                row.member_id,
                row.processor_customer_id,
                row.is_client as i64,
                row.ltv_all_minor,
                row.ltv_paid_minor,
                now,
            ],
        )?;
        Ok(())
    }

    /// Merge intake fields into an existing identity. Incoming values
    /// only fill gaps or add information; a sparser later submission
    /// never blanks a known field.
    pub fn merge_identity(&self, row: &IdentityRow) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE identity SET
                 email = COALESCE(?2, email),
                 phone = COALESCE(?3, phone),
                 display_name = COALESCE(?4, display_name),
                 name_key = COALESCE(?5, name_key),
                 channel = COALESCE(?6, channel),
                 tags = CASE WHEN ?7 = '[]' THEN tags ELSE ?7 END,
                 crm_contact_id = COALESCE(?8, crm_contact_id),
                 member_id = COALESCE(?9, member_id),
                 processor_customer_id = COALESCE(?10, processor_customer_id),
                 updated_at = ?11
             WHERE identity_id = ?1",
            params![
                row.identity_id,
                row.email,
                row.phone,
                row.display_name,
                normalize_name(row.display_name.as_deref()),
                row.channel,
                serde_json::to_string(&row.tags)?,
                row.crm_contact_id,
                row.member_id,
                row.processor_customer_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_identity(&self, identity_id: &str) -> EngineResult<Option<IdentityRow>> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identity WHERE identity_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [identity_id], identity_from_row)
            .optional()?)
    }

    pub fn find_identity_by_email(&self, email: &str) -> EngineResult<Option<IdentityRow>> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identity WHERE email = ?1");
        Ok(self
            .conn
            .query_row(&sql, [email], identity_from_row)
            .optional()?)
    }

    pub fn find_identity_by_phone(&self, phone: &str) -> EngineResult<Option<IdentityRow>> {
        let sql = format!(
            "SELECT {IDENTITY_COLUMNS} FROM identity WHERE phone = ?1
             ORDER BY created_at ASC LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, [phone], identity_from_row)
            .optional()?)
    }

    /// Tier-1 lookup across every external system id column.
    pub fn find_identity_by_external_id(
        &self,
        crm_contact_id: Option<&str>,
        member_id: Option<&str>,
        processor_customer_id: Option<&str>,
    ) -> EngineResult<Option<IdentityRow>> {
        for (column, value) in [
            ("crm_contact_id", crm_contact_id),
            ("member_id", member_id),
            ("processor_customer_id", processor_customer_id),
        ] {
            if let Some(value) = value {
                let sql =
                    format!("SELECT {IDENTITY_COLUMNS} FROM identity WHERE {column} = ?1");
                if let Some(row) = self
                    .conn
                    .query_row(&sql, [value], identity_from_row)
                    .optional()?
                {
                    return Ok(Some(row));
                }
            }
        }
        Ok(None)
    }

    /// All identities whose normalized full name equals `name_key`.
    /// The fuzzy tier needs the whole candidate set: more than one hit
    /// means ambiguity, never an arbitrary pick.
    pub fn identities_by_name_key(&self, name_key: &str) -> EngineResult<Vec<IdentityRow>> {
        let sql = format!(
            "SELECT {IDENTITY_COLUMNS} FROM identity WHERE name_key = ?1
             ORDER BY created_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([name_key], identity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn mark_identity_client(&self, identity_id: &str) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE identity SET is_client = 1, updated_at = ?2 WHERE identity_id = ?1",
            params![identity_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ── Derived LTV state ──────────────────────────────────────

    /// Replace an identity's LTV totals wholesale. Called only by the
    /// aggregator's recompute; these columns have no other writer.
    pub fn write_ltv_totals(
        &self,
        identity_id: &str,
        all_minor: MinorUnits,
        paid_minor: MinorUnits,
        categories: &[(Category, MinorUnits)],
    ) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE identity SET ltv_all_minor = ?2, ltv_paid_minor = ?3, updated_at = ?4
             WHERE identity_id = ?1",
            params![identity_id, all_minor, paid_minor, Utc::now().to_rfc3339()],
        )?;
        self.conn.execute(
            "DELETE FROM identity_ltv_category WHERE identity_id = ?1",
            [identity_id],
        )?;
        for (category, total) in categories {
            self.conn.execute(
                "INSERT INTO identity_ltv_category (identity_id, category, total_minor)
                 VALUES (?1, ?2, ?3)",
                params![identity_id, category.as_str(), total],
            )?;
        }
        Ok(())
    }

    pub fn ltv_categories(
        &self,
        identity_id: &str,
    ) -> EngineResult<Vec<(Category, MinorUnits)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, total_minor FROM identity_ltv_category
             WHERE identity_id = ?1 ORDER BY category ASC",
        )?;
        let rows = stmt
            .query_map([identity_id], |r| {
                Ok((Category::from_key(&r.get::<_, String>(0)?), r.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Page of identity ids after `cursor`, for chunked batch recompute.
    pub fn identity_ids_after(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> EngineResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT identity_id FROM identity WHERE identity_id > ?1
             ORDER BY identity_id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cursor.unwrap_or(""), limit as i64], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn identity_count(&self) -> EngineResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM identity", [], |r| r.get(0))?)
    }
}

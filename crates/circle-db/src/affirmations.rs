use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::models::{AFFIRMATION_COLUMNS, AffirmationRow};
use crate::{Database, OptionalExt};

/// Partial affirmation edit; `None` leaves a column as is.
#[derive(Debug, Default)]
pub struct AffirmationUpdate {
    pub text: Option<String>,
    pub sort_order: Option<i64>,
    pub is_active: Option<bool>,
}

impl Database {
    pub fn list_affirmations(&self, active_only: bool) -> Result<Vec<AffirmationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AFFIRMATION_COLUMNS} FROM affirmations
                 WHERE ?1 = 0 OR is_active = 1
                 ORDER BY sort_order ASC, created_at ASC"
            ))?;
            let rows = stmt
                .query_map([active_only], AffirmationRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_affirmations(&self) -> Result<u32> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM affirmations", [], |row| row.get(0))?;
            Ok(count)
        })
    }

    /// Insert `texts` at orders 1..=n if the store is empty. Returns whether
    /// anything was inserted.
    pub fn seed_affirmations(&self, texts: &[&str], created_by: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing: i64 = tx.query_row("SELECT COUNT(*) FROM affirmations", [], |row| row.get(0))?;
            if existing > 0 {
                return Ok(false);
            }

            let now = Utc::now();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO affirmations (id, text, sort_order, is_active, created_by, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 1, ?4, ?5, ?5)",
                )?;
                for (idx, text) in texts.iter().enumerate() {
                    let id = Uuid::new_v4().to_string();
                    stmt.execute(params![id, text, idx as i64 + 1, created_by, now])?;
                }
            }
            tx.commit()?;
            Ok(true)
        })
    }

    /// Insert an affirmation. Without an explicit order it is appended at
    /// `max(order) + 1`.
    pub fn insert_affirmation(
        &self,
        id: &str,
        text: &str,
        sort_order: Option<i64>,
        created_by: &str,
    ) -> Result<AffirmationRow> {
        self.with_conn(|conn| {
            let sort_order = match sort_order {
                Some(order) => order,
                None => max_order(conn)? + 1,
            };
            let now = Utc::now();
            conn.execute(
                "INSERT INTO affirmations (id, text, sort_order, is_active, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5, ?5)",
                params![id, text, sort_order, created_by, now],
            )?;
            query_affirmation(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("affirmation {} vanished after insert", id))
        })
    }

    pub fn update_affirmation(&self, id: &str, update: &AffirmationUpdate) -> Result<Option<AffirmationRow>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE affirmations SET
                    text = COALESCE(?2, text),
                    sort_order = COALESCE(?3, sort_order),
                    is_active = COALESCE(?4, is_active),
                    updated_at = ?5
                 WHERE id = ?1",
                params![id, update.text, update.sort_order, update.is_active, Utc::now()],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_affirmation(conn, id)
        })
    }

    pub fn delete_affirmation(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM affirmations WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    /// Exchange the `sort_order` of two affirmations inside one transaction.
    /// No other row changes. Returns `None` if either id is unknown.
    pub fn swap_affirmation_order(&self, first: &str, second: &str) -> Result<Option<(AffirmationRow, AffirmationRow)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let (Some(a), Some(b)) = (query_affirmation(&tx, first)?, query_affirmation(&tx, second)?) else {
                return Ok(None);
            };

            let now = Utc::now();
            tx.execute(
                "UPDATE affirmations SET sort_order = ?2, updated_at = ?3 WHERE id = ?1",
                params![a.id, b.sort_order, now],
            )?;
            tx.execute(
                "UPDATE affirmations SET sort_order = ?2, updated_at = ?3 WHERE id = ?1",
                params![b.id, a.sort_order, now],
            )?;

            let swapped_a = query_affirmation(&tx, first)?;
            let swapped_b = query_affirmation(&tx, second)?;
            tx.commit()?;

            Ok(swapped_a.zip(swapped_b))
        })
    }
}

fn max_order(conn: &Connection) -> Result<i64> {
    let max = conn.query_row("SELECT COALESCE(MAX(sort_order), 0) FROM affirmations", [], |row| row.get(0))?;
    Ok(max)
}

fn query_affirmation(conn: &Connection, id: &str) -> Result<Option<AffirmationRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {AFFIRMATION_COLUMNS} FROM affirmations WHERE id = ?1"))?;
    let row = stmt.query_row([id], AffirmationRow::from_row).optional()?;
    Ok(row)
}

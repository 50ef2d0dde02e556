use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use circle_types::LogStatus;
use rusqlite::params;

use crate::models::{LOG_COLUMNS, LogRow};
use crate::{Database, OptionalExt};

impl Database {
    /// Insert a day record. A second record for the same (user, day) fails
    /// with a UNIQUE violation; see [`crate::is_unique_violation`].
    pub fn insert_log(
        &self,
        id: &str,
        user_id: &str,
        day: NaiveDate,
        status: LogStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<LogRow> {
        self.with_conn(|conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO daily_logs (id, user_id, day, status, completed_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, user_id, day, status.as_str(), completed_at, created_at],
            )?;
            Ok(LogRow {
                id: id.to_string(),
                user_id: user_id.to_string(),
                day,
                status,
                completed_at,
                created_at,
            })
        })
    }

    /// Create or rewrite the record for one day. Only the override path uses this.
    pub fn upsert_log(
        &self,
        id: &str,
        user_id: &str,
        day: NaiveDate,
        status: LogStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO daily_logs (id, user_id, day, status, completed_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, day) DO UPDATE SET
                    status = excluded.status,
                    completed_at = excluded.completed_at",
                params![id, user_id, day, status.as_str(), completed_at, Utc::now()],
            )?;
            Ok(())
        })
    }

    pub fn get_log(&self, user_id: &str, day: NaiveDate) -> Result<Option<LogRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM daily_logs WHERE user_id = ?1 AND day = ?2"
            ))?;
            let row = stmt.query_row(params![user_id, day], LogRow::from_row).optional()?;
            Ok(row)
        })
    }

    /// Every log for the user, most recent day first.
    pub fn logs_for_user(&self, user_id: &str) -> Result<Vec<LogRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM daily_logs WHERE user_id = ?1 ORDER BY day DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], LogRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Most recent `limit` logs, newest first.
    pub fn recent_logs(&self, user_id: &str, limit: u32) -> Result<Vec<LogRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM daily_logs WHERE user_id = ?1 ORDER BY day DESC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![user_id, limit], LogRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Logs with `from <= day <= to`, oldest first.
    pub fn logs_between(&self, user_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<LogRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM daily_logs
                 WHERE user_id = ?1 AND day >= ?2 AND day <= ?3
                 ORDER BY day ASC"
            ))?;
            let rows = stmt
                .query_map(params![user_id, from, to], LogRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Logs across all users, skipping those owned by `exclude_email`.
    pub fn count_logs(&self, exclude_email: Option<&str>) -> Result<u32> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM daily_logs l
                 JOIN users u ON u.id = l.user_id
                 WHERE ?1 IS NULL OR u.email != ?1",
                [exclude_email],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

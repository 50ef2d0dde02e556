//! Database row types, mapped directly from SQLite rows.
//! Distinct from circle-types API models to keep the DB layer independent.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use circle_types::{LogStatus, Role};
use rusqlite::Row;
use rusqlite::types::Type;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub is_active: bool,
    pub push_token: Option<String>,
    pub reminder_enabled: bool,
    pub profile_picture: Option<String>,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub streak_overridden: bool,
    pub joined_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LogRow {
    pub id: String,
    pub user_id: String,
    pub day: NaiveDate,
    pub status: LogStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AffirmationRow {
    pub id: String,
    pub text: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub name: String,
    pub message: String,
    pub created_by: Option<String>,
    pub created_by_name: Option<String>,
    pub created_by_email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const USER_COLUMNS: &str = "id, name, email, password, role, is_active, push_token, \
     reminder_enabled, profile_picture, current_streak, longest_streak, streak_overridden, \
     joined_at, created_at";

pub(crate) const LOG_COLUMNS: &str = "id, user_id, day, status, completed_at, created_at";

pub(crate) const AFFIRMATION_COLUMNS: &str =
    "id, text, sort_order, is_active, created_by, created_at, updated_at";

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
            role: parse_column(row, 4)?,
            is_active: row.get(5)?,
            push_token: row.get(6)?,
            reminder_enabled: row.get(7)?,
            profile_picture: row.get(8)?,
            current_streak: row.get(9)?,
            longest_streak: row.get(10)?,
            streak_overridden: row.get(11)?,
            joined_at: row.get(12)?,
            created_at: row.get(13)?,
        })
    }
}

impl LogRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            day: row.get(2)?,
            status: parse_column(row, 3)?,
            completed_at: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl AffirmationRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            text: row.get(1)?,
            sort_order: row.get(2)?,
            is_active: row.get(3)?,
            created_by: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

/// Read a TEXT column into a type that parses from its stored string form.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

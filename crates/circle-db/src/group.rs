use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::models::{GroupRow, USER_COLUMNS, UserRow};
use crate::{Database, OptionalExt};

pub const DEFAULT_GROUP_NAME: &str = "Manifestation Circle";

impl Database {
    /// Load the singleton group, creating it with `default_message` on first use.
    pub fn get_or_create_group(&self, default_message: &str, creator_id: &str) -> Result<GroupRow> {
        self.with_conn(|conn| {
            let now = Utc::now();
            let created = conn.execute(
                "INSERT OR IGNORE INTO circle_group (id, name, message, created_by, created_at, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4, ?4)",
                params![DEFAULT_GROUP_NAME, default_message, creator_id, now],
            )?;
            if created > 0 {
                add_member(conn, creator_id)?;
            }
            query_group(conn)
        })
    }

    pub fn update_group_message(&self, message: &str, editor_id: &str) -> Result<GroupRow> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO circle_group (id, name, message, created_by, created_at, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET message = excluded.message, updated_at = excluded.updated_at",
                params![DEFAULT_GROUP_NAME, message, editor_id, now],
            )?;
            query_group(conn)
        })
    }

    pub fn add_group_member(&self, user_id: &str) -> Result<()> {
        self.with_conn(|conn| add_member(conn, user_id))
    }

    /// Active roster members, oldest member first, minus `exclude_email`.
    pub fn list_group_members(&self, exclude_email: Option<&str>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let columns = USER_COLUMNS
                .split(", ")
                .map(|c| format!("u.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns} FROM group_members gm
                 JOIN users u ON u.id = gm.user_id
                 WHERE u.is_active = 1 AND (?1 IS NULL OR u.email != ?1)
                 ORDER BY u.joined_at ASC"
            ))?;
            let rows = stmt
                .query_map([exclude_email], UserRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn add_member(conn: &Connection, user_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO group_members (user_id, added_at) VALUES (?1, ?2)",
        params![user_id, Utc::now()],
    )?;
    Ok(())
}

fn query_group(conn: &Connection) -> Result<GroupRow> {
    let row = conn
        .query_row(
            "SELECT g.name, g.message, g.created_by, u.name, u.email, g.updated_at
             FROM circle_group g
             LEFT JOIN users u ON u.id = g.created_by
             WHERE g.id = 1",
            [],
            |row| {
                Ok(GroupRow {
                    name: row.get(0)?,
                    message: row.get(1)?,
                    created_by: row.get(2)?,
                    created_by_name: row.get(3)?,
                    created_by_email: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    row.ok_or_else(|| anyhow::anyhow!("group row missing"))
}

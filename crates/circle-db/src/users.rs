use anyhow::Result;
use chrono::{DateTime, Utc};
use circle_types::Role;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};

use crate::models::{USER_COLUMNS, UserRow};
use crate::{Database, OptionalExt};

pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

/// Partial update applied by the super admin; `None` leaves a column as is.
#[derive(Debug, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub reminder_enabled: Option<bool>,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Filters for the paginated account listing.
#[derive(Debug, Default)]
pub struct UserFilter<'a> {
    pub exclude_email: Option<&'a str>,
    pub search: Option<&'a str>,
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct UserCounts {
    pub total: u32,
    pub admins: u32,
    pub active: u32,
    pub blocked: u32,
}

pub struct ReminderRecipient {
    pub user_id: String,
    pub token: String,
}

impl Database {
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, role, joined_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id,
                    user.name,
                    user.email,
                    user.password_hash,
                    user.role.as_str(),
                    user.joined_at,
                    Utc::now(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn count_active_users(&self, exclude_email: Option<&str>) -> Result<u32> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE is_active = 1 AND (?1 IS NULL OR email != ?1)",
                [exclude_email],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Page of users matching `filter`, newest first, plus the total match count.
    pub fn list_users(&self, filter: &UserFilter<'_>) -> Result<(Vec<UserRow>, u32)> {
        self.with_conn(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<Value> = Vec::new();

            if let Some(email) = filter.exclude_email {
                values.push(Value::Text(email.to_string()));
                clauses.push(format!("email != ?{}", values.len()));
            }
            if let Some(search) = filter.search.map(str::trim).filter(|s| !s.is_empty()) {
                values.push(Value::Text(format!("%{}%", escape_like(&search.to_lowercase()))));
                let n = values.len();
                clauses.push(format!(
                    "(LOWER(name) LIKE ?{n} ESCAPE '\\' OR LOWER(email) LIKE ?{n} ESCAPE '\\')"
                ));
            }
            if let Some(role) = filter.role {
                values.push(Value::Text(role.as_str().to_string()));
                clauses.push(format!("role = ?{}", values.len()));
            }
            if let Some(active) = filter.active {
                values.push(Value::Integer(active as i64));
                clauses.push(format!("is_active = ?{}", values.len()));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let total: u32 = conn.query_row(
                &format!("SELECT COUNT(*) FROM users {where_sql}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            values.push(Value::Integer(filter.limit as i64));
            values.push(Value::Integer(filter.offset as i64));
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users {where_sql}
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?{} OFFSET ?{}",
                values.len() - 1,
                values.len()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), UserRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }

    pub fn user_counts(&self, exclude_email: Option<&str>) -> Result<UserCounts> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(role = 'admin'), 0),
                        COALESCE(SUM(is_active = 1), 0),
                        COALESCE(SUM(is_active = 0), 0)
                 FROM users
                 WHERE ?1 IS NULL OR email != ?1",
                [exclude_email],
                |row| {
                    Ok(UserCounts {
                        total: row.get(0)?,
                        admins: row.get(1)?,
                        active: row.get(2)?,
                        blocked: row.get(3)?,
                    })
                },
            )?;
            Ok(counts)
        })
    }

    pub fn update_user_name(&self, id: &str, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("UPDATE users SET name = ?2 WHERE id = ?1", params![id, name])?;
            Ok(n > 0)
        })
    }

    pub fn update_user(&self, id: &str, update: &UserUpdate) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET
                    name = COALESCE(?2, name),
                    email = COALESCE(?3, email),
                    role = COALESCE(?4, role),
                    is_active = COALESCE(?5, is_active),
                    reminder_enabled = COALESCE(?6, reminder_enabled),
                    joined_at = COALESCE(?7, joined_at)
                 WHERE id = ?1",
                params![
                    id,
                    update.name,
                    update.email,
                    update.role.map(|r| r.as_str()),
                    update.is_active,
                    update.reminder_enabled,
                    update.joined_at,
                ],
            )?;
            Ok(n > 0)
        })
    }

    pub fn set_user_active(&self, id: &str, active: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("UPDATE users SET is_active = ?2 WHERE id = ?1", params![id, active])?;
            Ok(n > 0)
        })
    }

    pub fn set_user_role(&self, id: &str, role: Role) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET role = ?2 WHERE id = ?1",
                params![id, role.as_str()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn set_profile_picture(&self, id: &str, url: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET profile_picture = ?2 WHERE id = ?1", params![id, url])?;
            Ok(())
        })
    }

    pub fn set_push_token(&self, id: &str, token: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET push_token = ?2 WHERE id = ?1", params![id, token])?;
            Ok(())
        })
    }

    pub fn set_reminder_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET reminder_enabled = ?2 WHERE id = ?1",
                params![id, enabled],
            )?;
            Ok(())
        })
    }

    /// Store freshly computed streaks unless the super admin has pinned them.
    pub fn cache_streaks(&self, id: &str, current: u32, longest: u32) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET current_streak = ?2, longest_streak = ?3
                 WHERE id = ?1 AND streak_overridden = 0",
                params![id, current, longest],
            )?;
            Ok(())
        })
    }

    /// Pin streak values. Computed values stop overwriting them until
    /// [`Database::clear_streak_override`] is called.
    pub fn override_streaks(&self, id: &str, current: Option<u32>, longest: Option<u32>) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET
                    current_streak = COALESCE(?2, current_streak),
                    longest_streak = COALESCE(?3, longest_streak),
                    streak_overridden = 1
                 WHERE id = ?1",
                params![id, current, longest],
            )?;
            Ok(n > 0)
        })
    }

    pub fn clear_streak_override(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET streak_overridden = 0 WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Hard delete; logs and roster entries go with the user.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    pub fn reminder_recipients(&self) -> Result<Vec<ReminderRecipient>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, push_token FROM users
                 WHERE push_token IS NOT NULL AND push_token != ''
                   AND reminder_enabled = 1
                   AND is_active = 1
                 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ReminderRecipient {
                        user_id: row.get(0)?,
                        token: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Unset every listed token. Returns the number of users touched.
    pub fn clear_push_tokens(&self, tokens: &[String]) -> Result<usize> {
        if tokens.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut touched = 0;
            {
                let mut stmt = tx.prepare("UPDATE users SET push_token = NULL WHERE push_token = ?1")?;
                for token in tokens {
                    touched += stmt.execute([token])?;
                }
            }
            tx.commit()?;
            Ok(touched)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;
    let row = stmt.query_row([value], UserRow::from_row).optional()?;
    Ok(row)
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            email               TEXT NOT NULL UNIQUE,
            password            TEXT NOT NULL,
            role                TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
            is_active           INTEGER NOT NULL DEFAULT 1,
            push_token          TEXT,
            reminder_enabled    INTEGER NOT NULL DEFAULT 1,
            profile_picture     TEXT,
            current_streak      INTEGER NOT NULL DEFAULT 0,
            longest_streak      INTEGER NOT NULL DEFAULT 0,
            streak_overridden   INTEGER NOT NULL DEFAULT 0,
            joined_at           TEXT NOT NULL,
            created_at          TEXT NOT NULL
        );

        -- One record per user per calendar day
        CREATE TABLE IF NOT EXISTS daily_logs (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            day             TEXT NOT NULL,
            status          TEXT NOT NULL CHECK (status IN ('done', 'missed')),
            completed_at    TEXT,
            created_at      TEXT NOT NULL,
            UNIQUE(user_id, day)
        );

        -- sort_order is deliberately not unique: a swap passes through duplicates
        CREATE TABLE IF NOT EXISTS affirmations (
            id          TEXT PRIMARY KEY,
            text        TEXT NOT NULL,
            sort_order  INTEGER NOT NULL CHECK (sort_order >= 1),
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_by  TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_affirmations_order
            ON affirmations(sort_order, is_active);

        -- Singleton row
        CREATE TABLE IF NOT EXISTS circle_group (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            name        TEXT NOT NULL,
            message     TEXT NOT NULL,
            created_by  TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS group_members (
            user_id     TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            added_at    TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

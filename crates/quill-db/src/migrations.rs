use rusqlite::Connection;
use tracing::info;

use crate::error::StoreResult;

pub fn run(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS roles (
            id           TEXT PRIMARY KEY,
            name         TEXT NOT NULL UNIQUE,
            is_default   INTEGER NOT NULL DEFAULT 0,
            permissions  INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_roles_default
            ON roles(is_default);

        CREATE TABLE IF NOT EXISTS users (
            id             TEXT PRIMARY KEY,
            email          TEXT NOT NULL UNIQUE,
            username       TEXT NOT NULL UNIQUE,
            password_hash  TEXT NOT NULL,
            role_id        TEXT NOT NULL REFERENCES roles(id),
            confirmed      INTEGER NOT NULL DEFAULT 0,
            name           TEXT,
            location       TEXT,
            about_me       TEXT,
            member_since   TEXT NOT NULL DEFAULT (datetime('now')),
            last_seen      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS follows (
            follower_id  TEXT NOT NULL REFERENCES users(id),
            followed_id  TEXT NOT NULL REFERENCES users(id),
            created_at   TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (follower_id, followed_id)
        );

        CREATE INDEX IF NOT EXISTS idx_follows_followed
            ON follows(followed_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

//! Database migration runner.
//!
//! Migrations are executed in order on every [`crate::Database::new`] /
//! [`crate::Database::open_at`] call. Each migration is guarded by the
//! `user_version` pragma so it runs exactly once.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version. Bump this and extend `run_migrations` whenever
/// the schema changes.
const CURRENT_VERSION: u32 = 1;

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        v001_initial(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    Ok(())
}

/// v001: token pair, unread queue, conversation-list snapshot.
///
/// Presence has no table on purpose: it must be re-synced live after a
/// reload.
fn v001_initial(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tokens (
             id            INTEGER PRIMARY KEY CHECK (id = 1),
             access_token  TEXT NOT NULL,
             refresh_token TEXT NOT NULL,
             updated_at    TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS unread_messages (
             message_id      TEXT PRIMARY KEY,
             conversation_id TEXT NOT NULL,
             sender_id       TEXT NOT NULL,
             sender_name     TEXT,
             sender_avatar   TEXT,
             content         TEXT NOT NULL,
             created_at      TEXT NOT NULL
         );

         CREATE INDEX IF NOT EXISTS idx_unread_conversation
             ON unread_messages (conversation_id);

         CREATE TABLE IF NOT EXISTS conversation_snapshot (
             id       INTEGER PRIMARY KEY CHECK (id = 1),
             body     TEXT NOT NULL,
             saved_at TEXT NOT NULL
         );",
    )
}

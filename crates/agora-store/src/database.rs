//! Snapshot database.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees
//! that migrations are run before any other operation. It persists the
//! credential pair and a denormalized snapshot of the unread queue and the
//! conversation list so the UI can render something useful on reload while
//! the live session catches up.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use agora_shared::types::{ConversationId, MessageId, UserId};

use crate::error::{Result, StoreError};
use crate::migrations;
use crate::models::{Conversation, TokenPair, UnreadEntry};

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the default application database in the
    /// platform-appropriate data directory.
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "agora", "agora").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("agora.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path. Used by tests.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }

    // -- tokens -------------------------------------------------------------

    pub fn save_tokens(&self, tokens: &TokenPair) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tokens (id, access_token, refresh_token, updated_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 updated_at = excluded.updated_at",
            params![
                tokens.access_token,
                tokens.refresh_token,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn load_tokens(&self) -> Result<Option<TokenPair>> {
        self.conn
            .query_row(
                "SELECT access_token, refresh_token FROM tokens WHERE id = 1",
                [],
                |row| {
                    Ok(TokenPair {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    /// Remove the stored credentials (logout).
    pub fn clear_tokens(&self) -> Result<()> {
        self.conn.execute("DELETE FROM tokens", [])?;
        Ok(())
    }

    // -- unread queue -------------------------------------------------------

    /// Insert an unread entry; duplicates by message id are ignored.
    pub fn insert_unread(&self, entry: &UnreadEntry) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO unread_messages
                 (message_id, conversation_id, sender_id, sender_name,
                  sender_avatar, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.message_id.as_str(),
                entry.conversation_id.as_str(),
                entry.sender_id.as_str(),
                entry.sender_name,
                entry.sender_avatar,
                entry.content,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_unread(&self, message_id: &MessageId) -> Result<bool> {
        let affected = self.conn.execute(
            "DELETE FROM unread_messages WHERE message_id = ?1",
            params![message_id.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_unread_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<usize> {
        let affected = self.conn.execute(
            "DELETE FROM unread_messages WHERE conversation_id = ?1",
            params![conversation_id.as_str()],
        )?;
        Ok(affected)
    }

    pub fn load_unread(&self) -> Result<Vec<UnreadEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT message_id, conversation_id, sender_id, sender_name,
                    sender_avatar, content, created_at
             FROM unread_messages
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map([], row_to_unread)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    // -- conversation snapshot ----------------------------------------------

    /// Store the conversation list as a single JSON snapshot row.
    pub fn save_conversation_snapshot(&self, conversations: &[Conversation]) -> Result<()> {
        let body = serde_json::to_string(conversations)?;
        self.conn.execute(
            "INSERT INTO conversation_snapshot (id, body, saved_at)
             VALUES (1, ?1, ?2)
             ON CONFLICT (id) DO UPDATE SET
                 body = excluded.body,
                 saved_at = excluded.saved_at",
            params![body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn load_conversation_snapshot(&self) -> Result<Vec<Conversation>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM conversation_snapshot WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match body {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Ok(Vec::new()),
        }
    }

    /// Wipe everything except the schema (logout).
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM tokens;
             DELETE FROM unread_messages;
             DELETE FROM conversation_snapshot;",
        )?;
        Ok(())
    }
}

fn row_to_unread(row: &rusqlite::Row<'_>) -> rusqlite::Result<UnreadEntry> {
    let created_at_str: String = row.get(6)?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(UnreadEntry {
        message_id: MessageId(row.get(0)?),
        conversation_id: ConversationId(row.get(1)?),
        sender_id: UserId(row.get(2)?),
        sender_name: row.get(3)?,
        sender_avatar: row.get(4)?,
        content: row.get(5)?,
        created_at,
    })
}

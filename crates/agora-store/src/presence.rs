//! Presence tracking.
//!
//! Maintains an in-memory map of userId → online/last-seen state, written
//! by socket events and read by the UI. Writes are last-write-wins per
//! field; presence is eventually consistent and stale-tolerant by design.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use agora_shared::types::UserId;

use crate::models::PresenceRecord;

/// Tracks the presence of every user the client has heard about.
#[derive(Debug, Clone, Default)]
pub struct PresenceStore {
    records: HashMap<UserId, PresenceRecord>,
}

impl PresenceStore {
    /// Create a new, empty presence store.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Mark a user online. `last_seen` is left untouched; it is irrelevant
    /// while the user is online.
    pub fn set_online(&mut self, user_id: UserId, timestamp: DateTime<Utc>) {
        let entry = self
            .records
            .entry(user_id.clone())
            .or_insert_with(|| PresenceRecord {
                user_id,
                is_online: true,
                last_seen: None,
                updated_at: timestamp,
            });
        entry.is_online = true;
        entry.updated_at = entry.updated_at.max(timestamp);
    }

    /// Mark a user offline, recording when they were last seen.
    pub fn set_offline(&mut self, user_id: UserId, timestamp: DateTime<Utc>) {
        let entry = self
            .records
            .entry(user_id.clone())
            .or_insert_with(|| PresenceRecord {
                user_id,
                is_online: false,
                last_seen: Some(timestamp),
                updated_at: timestamp,
            });
        entry.is_online = false;
        entry.last_seen = Some(timestamp);
        entry.updated_at = entry.updated_at.max(timestamp);
    }

    /// Generic upsert used for bulk/initial sync payloads.
    pub fn update_presence(
        &mut self,
        user_id: UserId,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    ) {
        if is_online {
            self.set_online(user_id, timestamp);
        } else {
            self.set_offline(user_id.clone(), last_seen.unwrap_or(timestamp));
            debug!(user = %user_id, "presence sync: offline");
        }
    }

    /// Get the presence record for a user, if one exists.
    pub fn get(&self, user_id: &UserId) -> Option<&PresenceRecord> {
        self.records.get(user_id)
    }

    /// Whether a user is currently known to be online.
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.records.get(user_id).is_some_and(|r| r.is_online)
    }

    /// Number of tracked users.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Empty the store (logout).
    pub fn clear_all(&mut self) {
        self.records.clear();
    }
}

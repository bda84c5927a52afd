//! Domain model structs held by the stores and (partially) persisted in the
//! local snapshot database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer or written as a JSON snapshot column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agora_shared::protocol::{AttachmentRef, MessageEvent, MessageKind};
use agora_shared::types::{ConversationId, MessageId, UserId};

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// One entry in the conversation list, ordered most-recent-first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: ConversationId,
    /// The other party, from the viewer's perspective.
    pub sender: Participant,
    /// Denormalized summary of the latest message, if any.
    pub last_message: Option<MessageSummary>,
    /// Server-reported count of unread messages in this conversation.
    pub unread_count: u32,
    /// Timestamp of the latest activity, used for list ordering.
    pub updated_at: DateTime<Utc>,
}

/// Display fields for the other participant of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: UserId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Denormalized summary of a conversation's latest message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageSummary {
    pub id: MessageId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Delivery status of a message, mutated in place by receipt events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

/// A single chat message in the active conversation's window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique within a conversation; duplicates are dropped on ingest.
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    /// Reply-to reference, if this message answers another.
    pub reply_to: Option<MessageId>,
    pub attachments: Vec<AttachmentRef>,
}

impl Message {
    /// Build the local entry for an inbound event. Inbound messages start
    /// as delivered; read receipts promote them later.
    pub fn from_event(event: &MessageEvent) -> Self {
        Self {
            id: event.message_id.clone(),
            conversation_id: event.conversation_id.clone(),
            sender_id: event.sender_id.clone(),
            content: event.content.clone(),
            kind: event.message_type,
            status: MessageStatus::Delivered,
            created_at: event.created_at,
            reply_to: event.reply_to.clone(),
            attachments: event.attachments.clone(),
        }
    }

    /// Build an optimistic entry for a message the user just sent.
    pub fn optimistic(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: String,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            content,
            kind: MessageKind::Text,
            status: MessageStatus::Sent,
            created_at: Utc::now(),
            reply_to: None,
            attachments: Vec::new(),
        }
    }
}

/// In-place patch applied by [`crate::MessageStore::update_message`].
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub status: Option<MessageStatus>,
    pub content: Option<String>,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Presence state for one user. `last_seen` is only meaningful while
/// `is_online` is false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    /// Timestamp of the last write; non-decreasing per user.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Unread queue
// ---------------------------------------------------------------------------

/// Derived record kept until the user marks the message (or its whole
/// conversation) as read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnreadEntry {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sender_name: Option<String>,
    pub sender_avatar: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl UnreadEntry {
    pub fn from_event(event: &MessageEvent) -> Self {
        Self {
            message_id: event.message_id.clone(),
            conversation_id: event.conversation_id.clone(),
            sender_id: event.sender_id.clone(),
            sender_name: event.sender_name.clone(),
            sender_avatar: event.sender_avatar.clone(),
            content: event.content.clone(),
            created_at: event.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// The persisted credential pair, shared with the session layer.
pub use agora_shared::types::TokenPair;

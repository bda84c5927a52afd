//! Conversation, message, unread-queue and typing state.
//!
//! The transport delivers at-least-once and without cross-conversation
//! ordering, so every ingest path here is an idempotent upsert keyed by a
//! stable id, never a blind append.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use agora_shared::types::{ConversationId, MessageId, UserId};

use crate::models::{Conversation, Message, MessagePatch, MessageSummary, UnreadEntry};

/// Default page size for the active conversation's message window.
pub const MESSAGE_PAGE_SIZE: u32 = 50;

/// Holds the conversation list, the active conversation's message window,
/// the unread queue and per-conversation typing sets.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    /// Ordered most-recent-first.
    conversations: Vec<Conversation>,
    /// The conversation whose message window is loaded, if any.
    current: Option<ConversationId>,
    /// Message window for the current conversation, in arrival order.
    messages: Vec<Message>,
    /// Pagination cursor for loading older messages.
    cursor: u32,
    /// Whether older pages remain on the server.
    has_more: bool,
    unread: Vec<UnreadEntry>,
    typing: HashMap<ConversationId, HashSet<UserId>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- conversations ------------------------------------------------------

    /// Replace the whole conversation list (initial REST fetch or snapshot).
    pub fn set_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    /// Upsert a conversation by id. A known conversation is patched in
    /// place and moved to the front; an unknown one is inserted at the
    /// front (most recent first).
    pub fn upsert_conversation(&mut self, conversation: Conversation) {
        if let Some(pos) = self
            .conversations
            .iter()
            .position(|c| c.id == conversation.id)
        {
            self.conversations.remove(pos);
        }
        self.conversations.insert(0, conversation);
    }

    /// Patch the denormalized summary for fresh inbound activity and move
    /// the conversation to the front. Unknown conversations are ignored;
    /// the REST refetch triggered by the integration layer fills them in.
    pub fn touch_conversation(
        &mut self,
        conversation_id: &ConversationId,
        summary: MessageSummary,
        increment_unread: bool,
    ) {
        let Some(pos) = self
            .conversations
            .iter()
            .position(|c| &c.id == conversation_id)
        else {
            debug!(conversation = %conversation_id, "activity for unknown conversation");
            return;
        };

        let mut conversation = self.conversations.remove(pos);
        conversation.updated_at = summary.created_at;
        conversation.last_message = Some(summary);
        if increment_unread {
            conversation.unread_count += 1;
        }
        self.conversations.insert(0, conversation);
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get_conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    // -- active window ------------------------------------------------------

    /// Switch the active conversation. Resets the loaded message window,
    /// the pagination cursor and the has-more flag; the window for a
    /// non-active conversation is never assumed to be fetched.
    pub fn set_current_conversation(&mut self, conversation_id: Option<ConversationId>) {
        if self.current == conversation_id {
            return;
        }
        self.current = conversation_id;
        self.messages.clear();
        self.cursor = 0;
        self.has_more = true;
    }

    pub fn current_conversation(&self) -> Option<&ConversationId> {
        self.current.as_ref()
    }

    /// Append a message to the active window unless one with the same id
    /// is already present (at-least-once delivery guard). Messages for
    /// other conversations are ignored.
    pub fn add_message(&mut self, message: Message) {
        if self.current.as_ref() != Some(&message.conversation_id) {
            return;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            debug!(message = %message.id, "duplicate message dropped");
            return;
        }
        self.messages.push(message);
    }

    /// In-place merge, used for status transitions and server-side edits.
    /// Unknown ids are a no-op.
    pub fn update_message(&mut self, id: &MessageId, patch: MessagePatch) {
        let Some(message) = self.messages.iter_mut().find(|m| &m.id == id) else {
            return;
        };
        if let Some(status) = patch.status {
            message.status = status;
        }
        if let Some(content) = patch.content {
            message.content = content;
        }
    }

    /// Prepend an older page of messages (pagination), deduplicating by id.
    pub fn prepend_page(&mut self, page: Vec<Message>, has_more: bool) {
        let fresh: Vec<Message> = page
            .into_iter()
            .filter(|m| !self.messages.iter().any(|e| e.id == m.id))
            .collect();
        self.cursor += fresh.len() as u32;
        self.has_more = has_more;
        let mut merged = fresh;
        merged.append(&mut self.messages);
        self.messages = merged;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    // -- unread queue -------------------------------------------------------

    /// Queue an unread entry; a second event for the same message id is a
    /// no-op.
    pub fn add_unread(&mut self, entry: UnreadEntry) {
        if self
            .unread
            .iter()
            .any(|u| u.message_id == entry.message_id)
        {
            return;
        }
        self.unread.push(entry);
    }

    /// Drop all unread entries for a conversation and zero its counter.
    pub fn mark_conversation_read(&mut self, conversation_id: &ConversationId) {
        self.unread.retain(|u| &u.conversation_id != conversation_id);
        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| &c.id == conversation_id)
        {
            conversation.unread_count = 0;
        }
    }

    /// Drop a single unread entry.
    pub fn mark_read(&mut self, message_id: &MessageId) {
        self.unread.retain(|u| &u.message_id != message_id);
    }

    pub fn unread(&self) -> &[UnreadEntry] {
        &self.unread
    }

    /// Total unread messages across all conversations.
    pub fn unread_total(&self) -> usize {
        self.unread.len()
    }

    // -- typing -------------------------------------------------------------

    /// Idempotent add/remove into the per-conversation typing set. The
    /// server is the sole authority for start/stop; no timestamps are kept.
    pub fn update_typing(
        &mut self,
        conversation_id: ConversationId,
        user_id: UserId,
        is_typing: bool,
    ) {
        if is_typing {
            self.typing
                .entry(conversation_id)
                .or_default()
                .insert(user_id);
        } else if let Some(set) = self.typing.get_mut(&conversation_id) {
            set.remove(&user_id);
            if set.is_empty() {
                self.typing.remove(&conversation_id);
            }
        }
    }

    /// Who is currently typing in a conversation.
    pub fn typing_users(&self, conversation_id: &ConversationId) -> Vec<&UserId> {
        self.typing
            .get(conversation_id)
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }

    /// Empty everything (logout).
    pub fn clear_all(&mut self) {
        self.conversations.clear();
        self.current = None;
        self.messages.clear();
        self.cursor = 0;
        self.has_more = true;
        self.unread.clear();
        self.typing.clear();
    }
}

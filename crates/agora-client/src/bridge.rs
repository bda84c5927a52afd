//! Session integration layer.
//!
//! [`SessionBridge`] is the single consumer of the session's event stream.
//! It fans every event out to the presence and message stores, the
//! snapshot database, the query cache and the notifier, and it wraps the
//! user-initiated operations (open a conversation, send, typing, mark
//! read) so optimistic local state and outbound frames stay paired.
//!
//! Stores are plain mutable state owned by the bridge; the embedding shell
//! wraps the whole bridge in `Arc<Mutex<>>` and [`run_bridge`] drives it
//! from the event channel.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use agora_net::{SessionEvent, SessionHandle};
use agora_shared::constants::TOAST_PREVIEW_CHARS;
use agora_shared::protocol::{
    ClientEvent, ConversationReadEvent, MessageEvent, MessageReadEvent, NotificationEvent,
    PresenceEvent, SendMessage, ServerEvent,
};
use agora_shared::types::{ConversationId, LinkStatus, MessageId, UserId};
use agora_store::models::{Message, MessagePatch, MessageStatus, MessageSummary, UnreadEntry};
use agora_store::{Database, MessageStore, PresenceStore};

use crate::events::{
    Notifier, QueryCache, ToastNotice, QUERY_CONVERSATIONS, QUERY_MESSAGES, QUERY_NOTIFICATIONS,
};

/// Fans session events out to stores, persistence and UI side effects.
pub struct SessionBridge<N: Notifier, Q: QueryCache> {
    current_user: UserId,
    pub presence: PresenceStore,
    pub messages: MessageStore,
    database: Option<Database>,
    notifier: N,
    cache: Q,
    status: LinkStatus,
}

impl<N: Notifier, Q: QueryCache> SessionBridge<N, Q> {
    pub fn new(current_user: UserId, notifier: N, cache: Q) -> Self {
        Self {
            current_user,
            presence: PresenceStore::new(),
            messages: MessageStore::new(),
            database: None,
            notifier,
            cache,
            status: LinkStatus::Disconnected,
        }
    }

    /// Attach the snapshot database. Unread entries and side effects are
    /// persisted only when one is attached.
    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Last observed lifecycle state of the session link.
    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Seed the stores from the snapshot database so the UI has something
    /// to render before the live session catches up.
    pub fn restore_snapshot(&mut self) {
        let Some(database) = &self.database else {
            return;
        };
        match database.load_conversation_snapshot() {
            Ok(conversations) if !conversations.is_empty() => {
                self.messages.set_conversations(conversations);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "conversation snapshot load failed"),
        }
        match database.load_unread() {
            Ok(entries) => {
                for entry in entries {
                    self.messages.add_unread(entry);
                }
            }
            Err(e) => warn!(error = %e, "unread snapshot load failed"),
        }
    }

    // -- event fan-out ------------------------------------------------------

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::StatusChanged(status) => self.on_status(status),
            SessionEvent::Reconnecting { attempt, delay } => {
                info!(attempt, ?delay, "reconnect scheduled");
            }
            SessionEvent::TerminalDisconnect => {
                warn!("reconnect budget exhausted, staying offline");
            }
            SessionEvent::AuthFailed => self.on_auth_failed(),
            SessionEvent::TokensRefreshed(tokens) => {
                if let Some(database) = &self.database {
                    if let Err(e) = database.save_tokens(&tokens) {
                        warn!(error = %e, "token persist failed");
                    }
                }
            }
            SessionEvent::Server(event) => self.handle_server(event),
        }
    }

    fn handle_server(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage(event) => self.on_new_message(event),
            ServerEvent::TypingStart(e) => {
                self.messages.update_typing(e.conversation_id, e.user_id, true);
            }
            ServerEvent::TypingStop(e) => {
                self.messages.update_typing(e.conversation_id, e.user_id, false);
            }
            ServerEvent::MessageRead(event) => self.on_message_read(event),
            ServerEvent::ConversationRead(event) => self.on_conversation_read(event),
            ServerEvent::UserOnline(event) => self.on_online(event),
            ServerEvent::UserOffline(event) => self.on_offline(event),
            ServerEvent::PresenceUpdate(event) => self.on_presence_update(event),
            ServerEvent::Notification(event) => self.on_notification(event),
            other => debug!(?other, "unhandled server event"),
        }
    }

    fn on_status(&mut self, status: LinkStatus) {
        info!(?status, "session status changed");
        self.status = status;
        // Events may have been missed while offline; the room replay covers
        // the live stream but cached REST data must be refetched.
        if status == LinkStatus::Connected {
            self.cache.invalidate(QUERY_CONVERSATIONS);
            self.cache.invalidate(QUERY_MESSAGES);
        }
    }

    fn on_auth_failed(&mut self) {
        warn!("authentication failed, clearing local session");
        self.presence.clear_all();
        self.messages.clear_all();
        if let Some(database) = &self.database {
            if let Err(e) = database.clear_all() {
                warn!(error = %e, "local session wipe failed");
            }
        }
    }

    fn on_new_message(&mut self, event: MessageEvent) {
        // At-least-once delivery: a redelivered event must not bump the
        // unread counter or re-notify. The unread queue covers background
        // conversations; the last-message summary covers the active one.
        if self.already_ingested(&event) {
            debug!(message = %event.message_id, "duplicate message event dropped");
            return;
        }

        let own = event.sender_id == self.current_user;
        let active = self.messages.current_conversation() == Some(&event.conversation_id);

        if own {
            // Server echo of an optimistic send: promote the local entry,
            // never notify or count it as unread.
            self.messages.update_message(
                &event.message_id,
                MessagePatch {
                    status: Some(MessageStatus::Delivered),
                    ..Default::default()
                },
            );
            self.touch_from_event(&event, false);
            self.cache.invalidate(QUERY_MESSAGES);
            self.persist_snapshot();
            return;
        }

        self.messages.add_message(Message::from_event(&event));
        self.touch_from_event(&event, !active);

        if !active {
            let entry = UnreadEntry::from_event(&event);
            if let Some(database) = &self.database {
                if let Err(e) = database.insert_unread(&entry) {
                    warn!(error = %e, message = %entry.message_id, "unread persist failed");
                }
            }
            self.messages.add_unread(entry);

            let notice = ToastNotice {
                title: event.sender_name.clone().unwrap_or_else(|| "New message".into()),
                body: preview(&event.content),
                avatar_url: event.sender_avatar.clone(),
                conversation_id: Some(event.conversation_id.clone()),
                link: None,
            };
            self.notifier.toast(&notice);
            if self.notifier.permission_granted() {
                self.notifier.desktop(&notice);
            }
        }

        self.cache.invalidate(QUERY_CONVERSATIONS);
        self.cache.invalidate(QUERY_MESSAGES);
        self.persist_snapshot();
    }

    fn already_ingested(&self, event: &MessageEvent) -> bool {
        self.messages
            .unread()
            .iter()
            .any(|u| u.message_id == event.message_id)
            || self
                .messages
                .get_conversation(&event.conversation_id)
                .and_then(|c| c.last_message.as_ref())
                .is_some_and(|m| m.id == event.message_id)
    }

    fn touch_from_event(&mut self, event: &MessageEvent, increment_unread: bool) {
        self.messages.touch_conversation(
            &event.conversation_id,
            MessageSummary {
                id: event.message_id.clone(),
                sender_id: event.sender_id.clone(),
                content: event.content.clone(),
                created_at: event.created_at,
            },
            increment_unread,
        );
    }

    fn on_message_read(&mut self, event: MessageReadEvent) {
        if event.reader_id == self.current_user {
            // Another device of ours read it; retire the unread entry.
            self.messages.mark_read(&event.message_id);
            if let Some(database) = &self.database {
                if let Err(e) = database.delete_unread(&event.message_id) {
                    warn!(error = %e, "unread delete failed");
                }
            }
        } else {
            // The other party read our message; promote its status.
            self.messages.update_message(
                &event.message_id,
                MessagePatch {
                    status: Some(MessageStatus::Read),
                    ..Default::default()
                },
            );
        }
        self.cache.invalidate(QUERY_CONVERSATIONS);
    }

    fn on_conversation_read(&mut self, event: ConversationReadEvent) {
        if event.reader_id == self.current_user {
            self.clear_unread_local(&event.conversation_id);
        } else {
            let own_ids: Vec<MessageId> = self
                .messages
                .messages()
                .iter()
                .filter(|m| {
                    m.conversation_id == event.conversation_id
                        && m.sender_id == self.current_user
                })
                .map(|m| m.id.clone())
                .collect();
            for id in own_ids {
                self.messages.update_message(
                    &id,
                    MessagePatch {
                        status: Some(MessageStatus::Read),
                        ..Default::default()
                    },
                );
            }
        }
        self.cache.invalidate(QUERY_CONVERSATIONS);
    }

    fn on_online(&mut self, event: PresenceEvent) {
        let at = event.timestamp.unwrap_or_else(Utc::now);
        self.presence.set_online(event.user_id, at);
    }

    fn on_offline(&mut self, event: PresenceEvent) {
        let at = event
            .last_seen
            .or(event.timestamp)
            .unwrap_or_else(Utc::now);
        self.presence.set_offline(event.user_id, at);
    }

    fn on_presence_update(&mut self, event: PresenceEvent) {
        let at = event.timestamp.unwrap_or_else(Utc::now);
        self.presence
            .update_presence(event.user_id, event.is_online, event.last_seen, at);
    }

    fn on_notification(&mut self, event: NotificationEvent) {
        let notification = event.flatten();
        self.cache.invalidate(QUERY_NOTIFICATIONS);

        let notice = ToastNotice {
            title: notification.title,
            body: preview(&notification.body),
            avatar_url: None,
            conversation_id: None,
            link: notification.link,
        };
        self.notifier.toast(&notice);
        if notification.high_priority && self.notifier.permission_granted() {
            self.notifier.desktop(&notice);
        }
    }

    // -- user-initiated operations ------------------------------------------

    /// Make a conversation active and subscribe to its room.
    pub fn open_conversation(&mut self, session: &SessionHandle, id: ConversationId) {
        self.messages.set_current_conversation(Some(id.clone()));
        session.join_room(id);
    }

    /// Leave the active conversation's room and clear the window.
    pub fn close_conversation(&mut self, session: &SessionHandle) {
        if let Some(id) = self.messages.current_conversation().cloned() {
            session.leave_room(id);
        }
        self.messages.set_current_conversation(None);
    }

    /// Send a message with an optimistic local entry. Returns the locally
    /// generated id the server echo will reconcile against.
    pub fn send_message(
        &mut self,
        session: &SessionHandle,
        conversation_id: ConversationId,
        content: String,
        reply_to: Option<MessageId>,
    ) -> MessageId {
        let id = MessageId::generate();
        self.messages.add_message(Message::optimistic(
            id.clone(),
            conversation_id.clone(),
            self.current_user.clone(),
            content.clone(),
        ));
        if self.status != LinkStatus::Connected {
            // The frame would be dropped; fail the local entry so the UI
            // can offer a retry.
            warn!(message = %id, "send while offline, marking failed");
            self.messages.update_message(
                &id,
                MessagePatch {
                    status: Some(MessageStatus::Failed),
                    ..Default::default()
                },
            );
            return id;
        }
        session.emit(ClientEvent::SendMessage(SendMessage {
            message_id: id.clone(),
            conversation_id,
            content,
            reply_to,
            attachments: Vec::new(),
        }));
        id
    }

    pub fn set_typing(
        &self,
        session: &SessionHandle,
        conversation_id: ConversationId,
        typing: bool,
    ) {
        let event = if typing {
            ClientEvent::TypingStart { conversation_id }
        } else {
            ClientEvent::TypingStop { conversation_id }
        };
        session.emit(event);
    }

    /// Mark a single message read, locally and on the server.
    pub fn mark_message_read(
        &mut self,
        session: &SessionHandle,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) {
        self.messages.mark_read(&message_id);
        if let Some(database) = &self.database {
            if let Err(e) = database.delete_unread(&message_id) {
                warn!(error = %e, "unread delete failed");
            }
        }
        session.emit(ClientEvent::MarkRead {
            conversation_id,
            message_id,
        });
        self.cache.invalidate(QUERY_CONVERSATIONS);
    }

    /// Mark a whole conversation read, locally and on the server.
    pub fn mark_conversation_read(
        &mut self,
        session: &SessionHandle,
        conversation_id: ConversationId,
    ) {
        self.clear_unread_local(&conversation_id);
        session.emit(ClientEvent::MarkConversationRead { conversation_id });
        self.cache.invalidate(QUERY_CONVERSATIONS);
    }

    /// Disconnect and wipe everything local (logout).
    pub fn sign_out(&mut self, session: &SessionHandle) {
        session.disconnect();
        self.on_auth_failed();
    }

    fn clear_unread_local(&mut self, conversation_id: &ConversationId) {
        self.messages.mark_conversation_read(conversation_id);
        if let Some(database) = &self.database {
            if let Err(e) = database.delete_unread_for_conversation(conversation_id) {
                warn!(error = %e, conversation = %conversation_id, "unread delete failed");
            }
        }
        self.persist_snapshot();
    }

    /// Write the current conversation list to the snapshot database so a
    /// reload can render it before the live session catches up.
    fn persist_snapshot(&self) {
        if let Some(database) = &self.database {
            if let Err(e) = database.save_conversation_snapshot(self.messages.conversations()) {
                warn!(error = %e, "conversation snapshot persist failed");
            }
        }
    }
}

/// Truncate notification body text to a toast-sized preview.
fn preview(content: &str) -> String {
    let mut out: String = content.chars().take(TOAST_PREVIEW_CHARS).collect();
    if out.len() < content.len() {
        out.push('…');
    }
    out
}

/// Align the session with authentication state: connect when a token is
/// present (asking for notification permission first), disconnect when it
/// is gone.
pub async fn sync_auth_state<N: Notifier>(
    session: &SessionHandle,
    notifier: &N,
    access_token: Option<String>,
) -> Result<(), agora_shared::error::AgoraError> {
    match access_token {
        Some(token) => {
            notifier.request_permission();
            session.connect(token).await
        }
        None => {
            session.disconnect();
            Ok(())
        }
    }
}

/// Drive a bridge from the session's event stream until it closes.
pub async fn run_bridge<N, Q>(
    bridge: Arc<Mutex<SessionBridge<N, Q>>>,
    mut events: tokio::sync::mpsc::Receiver<SessionEvent>,
) where
    N: Notifier,
    Q: QueryCache,
{
    info!("session bridge running");
    while let Some(event) = events.recv().await {
        match bridge.lock() {
            Ok(mut guard) => guard.handle_event(event),
            Err(_) => {
                warn!("bridge mutex poisoned, stopping");
                return;
            }
        }
    }
    info!("session event stream closed");
}

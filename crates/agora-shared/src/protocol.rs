use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, UserId};

/// Events pushed by the server over the WebSocket.
///
/// Frames are JSON objects of the shape `{"event": "...", "data": {...}}`;
/// the `event` names match the gateway's wire vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Handshake accepted; the session is live.
    #[serde(rename = "connect")]
    Connect,

    /// Handshake rejected. The message decides auth vs transient handling.
    #[serde(rename = "connect_error")]
    ConnectError(ErrorPayload),

    /// Server-initiated disconnect (the link will close right after).
    #[serde(rename = "disconnect")]
    Disconnect(ErrorPayload),

    /// Mid-session credential rejection.
    #[serde(rename = "auth_error")]
    AuthError(ErrorPayload),

    /// The access token is about to expire; refresh and reconnect.
    #[serde(rename = "token_refresh_required")]
    TokenRefreshRequired,

    #[serde(rename = "new:message")]
    NewMessage(MessageEvent),

    #[serde(rename = "message:typing:start")]
    TypingStart(TypingEvent),

    #[serde(rename = "message:typing:stop")]
    TypingStop(TypingEvent),

    #[serde(rename = "message:read")]
    MessageRead(MessageReadEvent),

    #[serde(rename = "conversation:read")]
    ConversationRead(ConversationReadEvent),

    #[serde(rename = "user:online")]
    UserOnline(PresenceEvent),

    #[serde(rename = "user:offline")]
    UserOffline(PresenceEvent),

    #[serde(rename = "presence:update")]
    PresenceUpdate(PresenceEvent),

    #[serde(rename = "notification:new")]
    Notification(NotificationEvent),
}

/// Events the client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// First frame after the transport opens; carries the bearer token.
    #[serde(rename = "auth")]
    Auth { token: String },

    #[serde(rename = "join:conversation")]
    JoinConversation { conversation_id: ConversationId },

    #[serde(rename = "leave:conversation")]
    LeaveConversation { conversation_id: ConversationId },

    #[serde(rename = "message:send")]
    SendMessage(SendMessage),

    #[serde(rename = "message:typing:start")]
    TypingStart { conversation_id: ConversationId },

    #[serde(rename = "message:typing:stop")]
    TypingStop { conversation_id: ConversationId },

    #[serde(rename = "mark:read")]
    MarkRead {
        conversation_id: ConversationId,
        message_id: MessageId,
    },

    #[serde(rename = "mark:conversation:read")]
    MarkConversationRead { conversation_id: ConversationId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: String,
}

/// An inbound chat message. Sender display fields are optional; the
/// gateway omits them for system messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageEvent {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_avatar: Option<String>,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageKind,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    System,
    Image,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentRef {
    pub url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypingEvent {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageReadEvent {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub reader_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationReadEvent {
    pub conversation_id: ConversationId,
    pub reader_id: UserId,
}

/// Presence change for a single user. `last_seen` is only present on
/// offline transitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceEvent {
    pub user_id: UserId,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A generic notification push. The gateway is inconsistent about shape:
/// some fields arrive top-level, some nested under `data`. Consumers must
/// normalize via [`NotificationEvent::flatten`] before use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub data: Option<NotificationData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NotificationData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

/// One canonical notification shape, produced at the integration boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub high_priority: bool,
    pub link: Option<String>,
}

impl NotificationEvent {
    /// Collapse the top-level/nested duplication into one canonical shape.
    /// Top-level fields win when both are present.
    pub fn flatten(self) -> Notification {
        let nested = self.data.unwrap_or_default();
        let priority = self.priority.or(nested.priority).unwrap_or_default();
        Notification {
            title: self.title.or(nested.title).unwrap_or_default(),
            body: self.body.or(nested.body).unwrap_or_default(),
            high_priority: priority.eq_ignore_ascii_case("high"),
            link: self.link.or(nested.link),
        }
    }
}

/// Fields used to send a message, including the locally generated id so the
/// optimistic entry can be reconciled with the server's acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendMessage {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub content: String,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl ServerEvent {
    /// Parse a raw text frame from the wire.
    pub fn from_frame(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl ClientEvent {
    /// Serialize to a text frame for the wire.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_frame_parses_by_event_name() {
        let frame = r#"{
            "event": "new:message",
            "data": {
                "message_id": "m1",
                "conversation_id": "c1",
                "sender_id": "u2",
                "content": "hello",
                "created_at": "2026-01-01T00:00:00Z"
            }
        }"#;

        let event = ServerEvent::from_frame(frame).unwrap();
        match event {
            ServerEvent::NewMessage(msg) => {
                assert_eq!(msg.message_id, MessageId::from("m1"));
                assert_eq!(msg.message_type, MessageKind::Text);
                assert!(msg.sender_name.is_none());
                assert!(msg.attachments.is_empty());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_lifecycle_frames_without_data() {
        let event = ServerEvent::from_frame(r#"{"event": "connect"}"#).unwrap();
        assert_eq!(event, ServerEvent::Connect);

        let event =
            ServerEvent::from_frame(r#"{"event": "token_refresh_required"}"#).unwrap();
        assert_eq!(event, ServerEvent::TokenRefreshRequired);
    }

    #[test]
    fn test_outbound_frame_uses_wire_names() {
        let frame = ClientEvent::JoinConversation {
            conversation_id: ConversationId::from("c42"),
        }
        .to_frame()
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "join:conversation");
        assert_eq!(value["data"]["conversation_id"], "c42");
    }

    #[test]
    fn test_notification_flatten_prefers_top_level() {
        let event = NotificationEvent {
            title: Some("top".into()),
            body: None,
            priority: None,
            link: None,
            data: Some(NotificationData {
                title: Some("nested".into()),
                body: Some("nested body".into()),
                priority: Some("HIGH".into()),
                link: Some("/orders/7".into()),
            }),
        };

        let flat = event.flatten();
        assert_eq!(flat.title, "top");
        assert_eq!(flat.body, "nested body");
        assert!(flat.high_priority);
        assert_eq!(flat.link.as_deref(), Some("/orders/7"));
    }

    #[test]
    fn test_malformed_frame_is_an_error_not_a_panic() {
        assert!(ServerEvent::from_frame(r#"{"event": "new:message", "data": {}}"#).is_err());
        assert!(ServerEvent::from_frame("not json").is_err());
    }
}

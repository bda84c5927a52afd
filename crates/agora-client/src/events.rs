//! User-facing side-effect seams.
//!
//! The bridge never talks to a toast library or the OS notification API
//! directly; it goes through [`Notifier`], and cached REST data is
//! invalidated through [`QueryCache`]. Both are injected so the fan-out
//! logic stays testable.

use agora_shared::types::ConversationId;

/// Query-cache keys invalidated by realtime events.
pub const QUERY_CONVERSATIONS: &str = "conversations";
pub const QUERY_MESSAGES: &str = "messages";
pub const QUERY_NOTIFICATIONS: &str = "notifications";

/// Payload for a transient in-app toast or a desktop notification. The
/// UI's click handler invalidates cached data and navigates to
/// `conversation_id` / `link` when present.
#[derive(Debug, Clone, PartialEq)]
pub struct ToastNotice {
    pub title: String,
    pub body: String,
    pub avatar_url: Option<String>,
    pub conversation_id: Option<ConversationId>,
    pub link: Option<String>,
}

/// Sink for user-facing notifications.
pub trait Notifier: Send {
    /// Ask the platform for desktop-notification permission if the user
    /// has not decided yet.
    fn request_permission(&self);

    /// Whether desktop notifications may be shown.
    fn permission_granted(&self) -> bool;

    /// Show a transient in-app toast.
    fn toast(&self, notice: &ToastNotice);

    /// Raise a desktop notification. Only called when permission was
    /// granted.
    fn desktop(&self, notice: &ToastNotice);
}

/// Invalidation hook into the REST query cache.
pub trait QueryCache: Send {
    fn invalidate(&self, key: &str);
}

/// Application name
pub const APP_NAME: &str = "Agora";

/// WebSocket namespace path appended to the gateway URL
pub const REALTIME_NAMESPACE: &str = "/realtime";

/// Base delay for reconnect backoff, in milliseconds
pub const BACKOFF_BASE_MS: u64 = 1_000;

/// Maximum automatic reconnect attempts before the session goes terminal
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Handshake timeout: auth frame sent, `connect` not seen within this window
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Capacity of the session command channel
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the session event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Substrings that mark a connect error as authentication-related.
/// Matched case-insensitively against the server's error message.
pub const AUTH_ERROR_SIGNATURES: &[&str] = &[
    "unauthorized",
    "authentication",
    "invalid token",
    "token expired",
    "jwt expired",
    "401",
];

/// Toast body preview length for incoming messages, in characters
pub const TOAST_PREVIEW_CHARS: usize = 80;

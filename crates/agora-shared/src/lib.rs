//! # agora-shared
//!
//! Types shared across the Agora realtime client: identifier newtypes, the
//! JSON wire protocol spoken over the WebSocket, error types, and protocol
//! constants.

pub mod constants;
pub mod protocol;
pub mod types;

pub mod error;

pub use error::{AgoraError, AuthError, TransportError};
pub use protocol::{ClientEvent, ServerEvent};
pub use types::{ConversationId, LinkStatus, MessageId, TokenPair, UserId};

// Realtime session layer: a single multiplexed WebSocket connection with
// room-membership replay, exponential-backoff reconnects and a token-refresh
// flow, driven through typed command/event channels.

pub mod auth;
pub mod backoff;
pub mod rooms;
pub mod session;
pub mod transport;

pub use auth::{is_auth_error, RestTokenSource, TokenSource};
pub use backoff::ReconnectPolicy;
pub use rooms::RoomSet;
pub use session::{spawn_session, SessionConfig, SessionEvent, SessionHandle};
pub use transport::{Connector, Link, WsConnector};

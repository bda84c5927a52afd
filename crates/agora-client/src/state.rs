//! Application state shared across the client.
//!
//! [`AppState`] is wrapped in `Arc<Mutex<>>` by the embedding shell so UI
//! call sites and the bridge task see the same handles.

use agora_net::SessionHandle;
use agora_shared::types::UserId;
use agora_store::Database;

/// Central application state.
pub struct AppState {
    /// The authenticated user. `None` until login completes.
    pub current_user: Option<UserId>,

    /// Handle to the local snapshot database.
    /// `None` until the platform data dir is available.
    pub database: Option<Database>,

    /// Handle to the realtime session task, once spawned.
    pub session: Option<SessionHandle>,

    /// Base URL of the API gateway this client talks to.
    pub gateway_url: String,
}

impl AppState {
    /// Create a new, uninitialised application state.
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            current_user: None,
            database: None,
            session: None,
            gateway_url: gateway_url.into(),
        }
    }
}

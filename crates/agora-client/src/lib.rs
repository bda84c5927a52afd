//! # agora-client
//!
//! Integration layer of the Agora realtime client: wires session events
//! into the presence and message stores, user-facing notifications and
//! query-cache invalidation, and manages the session lifecycle against
//! authentication state. Also home of the live clock used to refresh
//! relative timestamps.

pub mod bridge;
pub mod clock;
pub mod events;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use bridge::{run_bridge, sync_auth_state, SessionBridge};
pub use clock::{format_relative, LiveClock};
pub use events::{Notifier, QueryCache, ToastNotice};
pub use state::AppState;

/// Initialise tracing for the client process. Honors `RUST_LOG`, with a
/// sensible default otherwise.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("agora_client=debug,agora_net=debug,agora_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

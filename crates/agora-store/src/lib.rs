//! # agora-store
//!
//! Client-side state for the realtime layer: the presence map, the
//! conversation/message/unread/typing store, and a small SQLite database
//! persisting the token pair plus a denormalized snapshot of unread
//! messages and the conversation list for fast reload.
//!
//! The stores are plain owned containers handed to whoever needs them;
//! nothing here is process-global. Presence is deliberately never
//! persisted — it must be re-synced live after a reload.

pub mod conversations;
pub mod database;
pub mod migrations;
pub mod models;
pub mod presence;

mod error;

pub use conversations::MessageStore;
pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use presence::PresenceStore;

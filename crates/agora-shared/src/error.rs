use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgoraError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Link closed: {0}")]
    Closed(String),

    #[error("Not connected")]
    NotConnected,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Credential rejected: {0}")]
    Rejected(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("No refresh token available")]
    NoRefreshToken,
}

//! Token refresh and auth-error classification.
//!
//! The session never retries an expired credential blindly: every
//! auth-classified failure routes through [`TokenSource::refresh`] first.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use agora_shared::constants::AUTH_ERROR_SIGNATURES;
use agora_shared::error::AuthError;
use agora_shared::types::TokenPair;

/// Whether a connect/handshake error message carries an authentication
/// signature (as opposed to a transient transport failure).
pub fn is_auth_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    AUTH_ERROR_SIGNATURES.iter().any(|sig| lowered.contains(sig))
}

/// Source of fresh credentials. The production implementation calls the
/// REST refresh endpoint; tests substitute a scripted one.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Exchange the held refresh token for a new access/refresh pair.
    async fn refresh(&self) -> Result<TokenPair, AuthError>;
}

/// Standard REST envelope: `{ code, message, data }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: u16,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RefreshData {
    access_token: String,
    refresh_token: String,
}

#[derive(serde::Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token source backed by the auth service's refresh endpoint. Holds the
/// current refresh token and rotates it on every successful exchange.
pub struct RestTokenSource {
    client: reqwest::Client,
    refresh_url: String,
    refresh_token: Mutex<Option<String>>,
}

impl RestTokenSource {
    pub fn new(refresh_url: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            refresh_url: refresh_url.into(),
            refresh_token: Mutex::new(refresh_token),
        }
    }

    /// Replace the held refresh token (e.g. after login).
    pub async fn set_refresh_token(&self, token: Option<String>) {
        *self.refresh_token.lock().await = token;
    }
}

#[async_trait]
impl TokenSource for RestTokenSource {
    async fn refresh(&self) -> Result<TokenPair, AuthError> {
        let mut held = self.refresh_token.lock().await;
        let refresh_token = held.clone().ok_or(AuthError::NoRefreshToken)?;

        debug!(url = %self.refresh_url, "refreshing access token");

        let response = self
            .client
            .post(&self.refresh_url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "refresh endpoint rejected the request");
            return Err(AuthError::RefreshFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let envelope: Envelope<RefreshData> = response
            .json()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let data = envelope.data.ok_or_else(|| {
            AuthError::RefreshFailed(format!(
                "empty envelope (code {}): {}",
                envelope.code, envelope.message
            ))
        })?;

        *held = Some(data.refresh_token.clone());

        Ok(TokenPair {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
        })
    }
}

//! Realtime session manager.
//!
//! A single tokio task owns the WebSocket link. External code talks to it
//! through a typed command channel and observes it through a typed event
//! channel, so the connect/auth/reconnect lifecycle stays in one place and
//! the rest of the client only ever sees its effects.
//!
//! Lifecycle is an explicit state machine over [`LinkStatus`]:
//! Disconnected → Connecting → Connected, with Backoff between reconnect
//! attempts after an unsolicited drop, RefreshingToken whenever the server
//! rejects the credential, and Terminal once the retry budget is spent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use agora_shared::constants::{
    COMMAND_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY, HANDSHAKE_TIMEOUT_SECS,
};
use agora_shared::error::{AgoraError, AuthError, TransportError};
use agora_shared::protocol::{ClientEvent, ServerEvent};
use agora_shared::types::{ConversationId, LinkStatus, TokenPair};

use crate::auth::{is_auth_error, TokenSource};
use crate::backoff::ReconnectPolicy;
use crate::rooms::RoomSet;
use crate::transport::{Connector, Link};

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Open (or confirm) the connection with the given bearer token.
    Connect {
        token: String,
        reply: oneshot::Sender<Result<(), AgoraError>>,
    },
    /// Close the link and forget the token. Room membership is kept.
    Disconnect,
    /// Record intent to be in a room; emitted immediately when connected.
    JoinRoom(ConversationId),
    /// Drop intent to be in a room; emitted immediately when connected.
    LeaveRoom(ConversationId),
    /// Fire-and-forget outbound event; silently dropped when offline.
    Emit(ClientEvent),
    /// Stop the task entirely.
    Shutdown,
}

/// Events sent *from* the session task to the application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The link moved to a new lifecycle state.
    StatusChanged(LinkStatus),
    /// A reconnect attempt has been scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// Retry budget exhausted; no further automatic attempts.
    TerminalDisconnect,
    /// Token refresh failed; the UI must re-authenticate.
    AuthFailed,
    /// Refresh produced a new credential pair; persist it.
    TokensRefreshed(TokenPair),
    /// A domain event pushed by the server.
    Server(ServerEvent),
}

/// Tunables for the session task.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub handshake_timeout: Duration,
    pub policy: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
            policy: ReconnectPolicy::default(),
        }
    }
}

/// Cloneable handle for driving the session task.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Connect with the given token. Resolves on the first successful
    /// handshake; idempotent when already connected. Auth-classified
    /// handshake failures route through the refresh flow before this
    /// returns.
    pub async fn connect(&self, token: impl Into<String>) -> Result<(), AgoraError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Connect {
                token: token.into(),
                reply,
            })
            .await
            .map_err(|_| task_gone())?;
        rx.await.map_err(|_| task_gone())?
    }

    pub fn disconnect(&self) {
        self.send(SessionCommand::Disconnect);
    }

    pub fn join_room(&self, room: ConversationId) {
        self.send(SessionCommand::JoinRoom(room));
    }

    pub fn leave_room(&self, room: ConversationId) {
        self.send(SessionCommand::LeaveRoom(room));
    }

    /// Fire-and-forget outbound traffic (send message, typing, mark read).
    /// Callers own any optimistic local state.
    pub fn emit(&self, event: ClientEvent) {
        self.send(SessionCommand::Emit(event));
    }

    pub fn shutdown(&self) {
        self.send(SessionCommand::Shutdown);
    }

    fn send(&self, cmd: SessionCommand) {
        if self.cmd_tx.try_send(cmd).is_err() {
            warn!("session command dropped (task gone or channel full)");
        }
    }
}

fn task_gone() -> AgoraError {
    AgoraError::Transport(TransportError::Closed("session task gone".into()))
}

/// Spawn the session task.
///
/// Returns the command handle and the event receiver.
pub fn spawn_session(
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    token_source: Arc<dyn TokenSource>,
) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let session = Session {
        config,
        connector,
        token_source,
        event_tx,
        link: None,
        token: None,
        rooms: RoomSet::new(),
        attempt: 0,
        backoff_until: None,
        status: LinkStatus::Disconnected,
    };

    tokio::spawn(session.run(cmd_rx));

    (SessionHandle { cmd_tx }, event_rx)
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

struct Session {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    token_source: Arc<dyn TokenSource>,
    event_tx: mpsc::Sender<SessionEvent>,
    /// The single live transport, if any.
    link: Option<Link>,
    token: Option<String>,
    rooms: RoomSet,
    /// Zero-based reconnect attempt counter; reset on every handshake.
    attempt: u32,
    backoff_until: Option<Instant>,
    status: LinkStatus,
}

enum Step {
    Cmd(Option<SessionCommand>),
    Inbound(Option<String>),
    BackoffFired,
}

impl Session {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        info!("session task started");

        loop {
            let step = if let Some(link) = self.link.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => Step::Cmd(cmd),
                    frame = link.incoming.recv() => Step::Inbound(frame),
                }
            } else if let Some(at) = self.backoff_until {
                tokio::select! {
                    cmd = cmd_rx.recv() => Step::Cmd(cmd),
                    _ = tokio::time::sleep_until(at) => Step::BackoffFired,
                }
            } else {
                Step::Cmd(cmd_rx.recv().await)
            };

            match step {
                Step::Cmd(None) => {
                    info!("command channel closed, stopping session task");
                    break;
                }
                Step::Cmd(Some(cmd)) => {
                    if self.handle_command(cmd).await {
                        break;
                    }
                }
                Step::Inbound(Some(text)) => self.handle_frame(&text).await,
                Step::Inbound(None) => {
                    warn!("link lost");
                    self.link = None;
                    self.schedule_backoff().await;
                }
                Step::BackoffFired => self.resume_from_backoff().await,
            }
        }

        info!("session task terminated");
    }

    /// Returns true when the task should stop.
    async fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::Connect { token, reply } => {
                if self.link.is_some() {
                    debug!("connect: already connected");
                    let _ = reply.send(Ok(()));
                    return false;
                }
                self.token = Some(token);
                self.backoff_until = None;
                self.attempt = 0;
                let result = self.connect_with_refresh().await;
                let _ = reply.send(result);
            }

            SessionCommand::Disconnect => {
                debug!("explicit disconnect");
                self.teardown().await;
            }

            SessionCommand::JoinRoom(room) => {
                self.rooms.join(room.clone());
                self.send_frame(&ClientEvent::JoinConversation {
                    conversation_id: room,
                })
                .await;
            }

            SessionCommand::LeaveRoom(room) => {
                self.rooms.leave(&room);
                self.send_frame(&ClientEvent::LeaveConversation {
                    conversation_id: room,
                })
                .await;
            }

            SessionCommand::Emit(event) => {
                self.send_frame(&event).await;
            }

            SessionCommand::Shutdown => return true,
        }
        false
    }

    /// Process one inbound frame. Lifecycle events are handled here; domain
    /// events are forwarded to the application.
    async fn handle_frame(&mut self, text: &str) {
        let event = match ServerEvent::from_frame(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match event {
            ServerEvent::Disconnect(payload) => {
                info!(reason = %payload.message, "server-initiated disconnect");
                self.link = None;
                self.schedule_backoff().await;
            }
            ServerEvent::AuthError(payload) => {
                warn!(reason = %payload.message, "mid-session auth error");
                self.refresh_and_reconnect().await;
            }
            ServerEvent::TokenRefreshRequired => {
                debug!("server requested a token refresh");
                self.refresh_and_reconnect().await;
            }
            ServerEvent::Connect | ServerEvent::ConnectError(_) => {
                debug!("stray handshake frame outside handshake");
            }
            other => self.emit_event(SessionEvent::Server(other)).await,
        }
    }

    /// One connect attempt, routing auth-classified failures through the
    /// refresh flow and retrying once with the fresh credential.
    async fn connect_with_refresh(&mut self) -> Result<(), AgoraError> {
        self.set_status(LinkStatus::Connecting).await;
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(AgoraError::Auth(err)) => {
                warn!(error = %err, "handshake rejected the credential");
                self.refresh_token().await?;
                self.set_status(LinkStatus::Connecting).await;
                match self.establish().await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        self.set_status(LinkStatus::Disconnected).await;
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.set_status(LinkStatus::Disconnected).await;
                Err(e)
            }
        }
    }

    /// Open the transport and run the auth handshake under a bounded
    /// timeout. On success the membership set is replayed: the server is
    /// stateless about rooms across reconnects.
    async fn establish(&mut self) -> Result<(), AgoraError> {
        let token = self
            .token
            .clone()
            .ok_or(AgoraError::Transport(TransportError::NotConnected))?;

        let mut link = self
            .connector
            .connect()
            .await
            .map_err(AgoraError::Transport)?;

        link.outgoing
            .send(ClientEvent::Auth { token }.to_frame()?)
            .await
            .map_err(|_| TransportError::Closed("link closed before auth".into()))
            .map_err(AgoraError::Transport)?;

        let deadline = Instant::now() + self.config.handshake_timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, link.incoming.recv())
                .await
                .map_err(|_| AgoraError::Transport(TransportError::HandshakeTimeout))?;
            let Some(text) = frame else {
                return Err(AgoraError::Transport(TransportError::Closed(
                    "link closed during handshake".into(),
                )));
            };
            match ServerEvent::from_frame(&text) {
                Ok(ServerEvent::Connect) => break,
                Ok(ServerEvent::ConnectError(payload)) => {
                    return Err(if is_auth_error(&payload.message) {
                        AgoraError::Auth(AuthError::Rejected(payload.message))
                    } else {
                        AgoraError::Transport(TransportError::ConnectFailed(payload.message))
                    });
                }
                Ok(other) => debug!(event = ?other, "event before handshake completed"),
                Err(e) => warn!(error = %e, "malformed frame during handshake"),
            }
        }

        self.link = Some(link);
        self.attempt = 0;
        self.backoff_until = None;
        self.set_status(LinkStatus::Connected).await;

        for room in self.rooms.snapshot() {
            self.send_frame(&ClientEvent::JoinConversation {
                conversation_id: room,
            })
            .await;
        }
        info!(rooms = self.rooms.len(), "session established");
        Ok(())
    }

    /// Mid-session credential rejection: refresh, then reconnect with the
    /// new token. A second auth rejection gives up rather than looping
    /// against a bad credential.
    async fn refresh_and_reconnect(&mut self) {
        self.link = None;
        if self.refresh_token().await.is_err() {
            // refresh_token already tore down and emitted AuthFailed
            return;
        }
        self.set_status(LinkStatus::Connecting).await;
        match self.establish().await {
            Ok(()) => {}
            Err(AgoraError::Auth(err)) => {
                warn!(error = %err, "fresh credential rejected, giving up");
                self.teardown().await;
                self.emit_event(SessionEvent::AuthFailed).await;
            }
            Err(e) => {
                warn!(error = %e, "reconnect after refresh failed");
                self.schedule_backoff().await;
            }
        }
    }

    /// Exchange the refresh token for a new pair and adopt the new access
    /// token. Failure tears the session down and surfaces AuthFailed.
    async fn refresh_token(&mut self) -> Result<(), AgoraError> {
        self.set_status(LinkStatus::RefreshingToken).await;
        match self.token_source.refresh().await {
            Ok(pair) => {
                self.token = Some(pair.access_token.clone());
                self.emit_event(SessionEvent::TokensRefreshed(pair)).await;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed");
                self.teardown().await;
                self.emit_event(SessionEvent::AuthFailed).await;
                Err(AgoraError::Auth(err))
            }
        }
    }

    /// Schedule the next reconnect attempt, or go terminal once the retry
    /// budget is spent.
    async fn schedule_backoff(&mut self) {
        self.link = None;
        if self.token.is_none() {
            // An explicit disconnect raced the drop; stay down.
            self.set_status(LinkStatus::Disconnected).await;
            return;
        }
        match self.config.policy.delay_for(self.attempt) {
            Some(delay) => {
                self.backoff_until = Some(Instant::now() + delay);
                self.set_status(LinkStatus::Backoff).await;
                self.emit_event(SessionEvent::Reconnecting {
                    attempt: self.attempt,
                    delay,
                })
                .await;
                info!(
                    attempt = self.attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.attempt += 1;
            }
            None => {
                self.backoff_until = None;
                self.set_status(LinkStatus::Terminal).await;
                self.emit_event(SessionEvent::TerminalDisconnect).await;
                warn!("reconnect attempts exhausted");
            }
        }
    }

    /// A scheduled reconnect fired. Re-check that we are still supposed to
    /// be connected before dialing.
    async fn resume_from_backoff(&mut self) {
        self.backoff_until = None;
        if self.token.is_none() {
            self.set_status(LinkStatus::Disconnected).await;
            return;
        }
        self.set_status(LinkStatus::Connecting).await;
        match self.establish().await {
            Ok(()) => {}
            Err(AgoraError::Auth(_)) => {
                if self.refresh_token().await.is_err() {
                    return;
                }
                self.set_status(LinkStatus::Connecting).await;
                match self.establish().await {
                    Ok(()) => {}
                    Err(AgoraError::Auth(err)) => {
                        warn!(error = %err, "fresh credential rejected, giving up");
                        self.teardown().await;
                        self.emit_event(SessionEvent::AuthFailed).await;
                    }
                    Err(_) => self.schedule_backoff().await,
                }
            }
            Err(_) => self.schedule_backoff().await,
        }
    }

    /// Close the link and forget the credential. The membership set is
    /// intent and survives; a later connect replays it.
    async fn teardown(&mut self) {
        self.link = None;
        self.token = None;
        self.attempt = 0;
        self.backoff_until = None;
        self.set_status(LinkStatus::Disconnected).await;
    }

    async fn send_frame(&mut self, event: &ClientEvent) {
        let Some(link) = self.link.as_ref() else {
            debug!("outbound event dropped: not connected");
            return;
        };
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound event");
                return;
            }
        };
        if link.outgoing.send(frame).await.is_err() {
            warn!("write pump gone, outbound event dropped");
        }
    }

    async fn set_status(&mut self, status: LinkStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.emit_event(SessionEvent::StatusChanged(status)).await;
    }

    async fn emit_event(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event).await;
    }
}

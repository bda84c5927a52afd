//! Session lifecycle tests against a scripted in-memory transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use agora_net::{
    spawn_session, Connector, Link, ReconnectPolicy, SessionConfig, SessionEvent, TokenSource,
};
use agora_shared::error::{AuthError, TransportError};
use agora_shared::protocol::ClientEvent;
use agora_shared::types::{ConversationId, LinkStatus, TokenPair};

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// Outcome of the next `connect()` call.
enum Script {
    /// Fail before the link opens.
    Refuse(String),
    /// Open a link and answer the auth frame with this raw frame.
    Handshake(String),
    /// Open a link and accept the handshake.
    Accept,
}

/// Test-side handles for one opened link.
struct TestLink {
    /// Frames the session sent after the auth frame.
    sent: mpsc::UnboundedReceiver<String>,
    /// Inject inbound frames; dropping this closes the link.
    push: mpsc::Sender<String>,
    /// The captured auth frame.
    auth_frame: String,
}

struct ScriptedConnector {
    script: Mutex<VecDeque<Script>>,
    links: mpsc::UnboundedSender<TestLink>,
    calls: AtomicU32,
}

impl ScriptedConnector {
    fn new(script: Vec<Script>) -> (Arc<Self>, mpsc::UnboundedReceiver<TestLink>) {
        let (links, links_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                script: Mutex::new(script.into()),
                links,
                calls: AtomicU32::new(0),
            }),
            links_rx,
        )
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .await
            .pop_front()
            .expect("connector called more often than scripted");

        let response = match step {
            Script::Refuse(message) => return Err(TransportError::ConnectFailed(message)),
            Script::Accept => r#"{"event":"connect"}"#.to_string(),
            Script::Handshake(frame) => frame,
        };

        let (outgoing, mut outgoing_rx) = mpsc::channel::<String>(64);
        let (incoming_tx, incoming) = mpsc::channel::<String>(64);
        let links = self.links.clone();

        tokio::spawn(async move {
            let Some(auth_frame) = outgoing_rx.recv().await else {
                return;
            };
            let _ = incoming_tx.send(response).await;

            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            let _ = links.send(TestLink {
                sent: sent_rx,
                push: incoming_tx,
                auth_frame,
            });

            while let Some(frame) = outgoing_rx.recv().await {
                if sent_tx.send(frame).is_err() {
                    break;
                }
            }
        });

        Ok(Link { outgoing, incoming })
    }
}

// ---------------------------------------------------------------------------
// Scripted token source
// ---------------------------------------------------------------------------

struct ScriptedTokens {
    results: Mutex<VecDeque<Result<TokenPair, AuthError>>>,
    calls: AtomicU32,
}

impl ScriptedTokens {
    fn new(results: Vec<Result<TokenPair, AuthError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn none() -> Arc<Self> {
        Self::new(Vec::new())
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for ScriptedTokens {
    async fn refresh(&self) -> Result<TokenPair, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(AuthError::NoRefreshToken))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_config() -> SessionConfig {
    SessionConfig {
        handshake_timeout: Duration::from_secs(1),
        policy: ReconnectPolicy::new(Duration::from_millis(10), 3),
    }
}

fn connect_error(message: &str) -> Script {
    Script::Handshake(format!(
        r#"{{"event":"connect_error","data":{{"message":"{message}"}}}}"#
    ))
}

/// Parse a frame and return the conversation id if it is a join request.
fn as_join(frame: &str) -> Option<ConversationId> {
    match serde_json::from_str::<ClientEvent>(frame) {
        Ok(ClientEvent::JoinConversation { conversation_id }) => Some(conversation_id),
        _ => None,
    }
}

async fn next_link(links: &mut mpsc::UnboundedReceiver<TestLink>) -> TestLink {
    timeout(Duration::from_secs(2), links.recv())
        .await
        .expect("timed out waiting for a link")
        .expect("connector gone")
}

async fn next_frame(link: &mut TestLink) -> String {
    timeout(Duration::from_secs(2), link.sent.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("link gone")
}

/// Drain events for the given window, returning everything seen.
async fn drain_events(
    events: &mut mpsc::Receiver<SessionEvent>,
    window: Duration,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            break;
        }
        match timeout(deadline - now, events.recv()).await {
            Ok(Some(event)) => seen.push(event),
            _ => break,
        }
    }
    seen
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnect_replays_each_room_exactly_once() {
    let (connector, mut links) = ScriptedConnector::new(vec![Script::Accept, Script::Accept]);
    let (handle, _events) = spawn_session(fast_config(), connector.clone(), ScriptedTokens::none());

    handle.connect("tok").await.unwrap();
    let mut first = next_link(&mut links).await;

    handle.join_room(ConversationId::from("A"));
    handle.join_room(ConversationId::from("B"));
    assert!(as_join(&next_frame(&mut first).await).is_some());
    assert!(as_join(&next_frame(&mut first).await).is_some());

    // Unsolicited drop: the server side goes away.
    drop(first.push);

    let mut second = next_link(&mut links).await;
    let mut joins = vec![
        as_join(&next_frame(&mut second).await).expect("expected a join"),
        as_join(&next_frame(&mut second).await).expect("expected a join"),
    ];
    joins.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(joins, vec![ConversationId::from("A"), ConversationId::from("B")]);

    // No third join, no duplicates.
    assert!(
        timeout(Duration::from_millis(100), second.sent.recv())
            .await
            .is_err(),
        "unexpected extra frame after replay"
    );
    assert_eq!(connector.calls(), 2);
}

#[tokio::test]
async fn backoff_grows_then_goes_terminal() {
    let (connector, mut links) = ScriptedConnector::new(vec![
        Script::Accept,
        Script::Refuse("connection refused".into()),
        Script::Refuse("connection refused".into()),
        Script::Refuse("connection refused".into()),
    ]);
    let (handle, mut events) =
        spawn_session(fast_config(), connector.clone(), ScriptedTokens::none());

    handle.connect("tok").await.unwrap();
    let first = next_link(&mut links).await;
    drop(first.push);

    let seen = drain_events(&mut events, Duration::from_millis(500)).await;

    let delays: Vec<Duration> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Reconnecting { delay, .. } => Some(*delay),
            _ => None,
        })
        .collect();
    assert_eq!(delays.len(), 3, "one scheduled attempt per budget slot");
    assert!(delays.windows(2).all(|w| w[0] <= w[1]), "delays must not shrink");

    assert!(seen
        .iter()
        .any(|e| matches!(e, SessionEvent::TerminalDisconnect)));
    assert!(seen
        .iter()
        .any(|e| matches!(e, SessionEvent::StatusChanged(LinkStatus::Terminal))));

    // Budget spent: the initial dial plus three retries, nothing after.
    assert_eq!(connector.calls(), 4);
}

#[tokio::test]
async fn auth_connect_error_routes_through_refresh_not_backoff() {
    let (connector, _links) = ScriptedConnector::new(vec![connect_error("unauthorized")]);
    let tokens = ScriptedTokens::new(vec![Err(AuthError::RefreshFailed("revoked".into()))]);
    let (handle, mut events) = spawn_session(fast_config(), connector.clone(), tokens.clone());

    let result = handle.connect("stale").await;
    assert!(matches!(result, Err(agora_shared::AgoraError::Auth(_))));

    // The refresh flow ran; the backoff path never did.
    assert_eq!(tokens.calls(), 1);
    assert_eq!(connector.calls(), 1);

    let seen = drain_events(&mut events, Duration::from_millis(200)).await;
    assert!(seen.iter().any(|e| matches!(e, SessionEvent::AuthFailed)));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, SessionEvent::Reconnecting { .. })));
}

#[tokio::test]
async fn successful_refresh_reconnects_with_the_new_token() {
    let (connector, mut links) =
        ScriptedConnector::new(vec![connect_error("jwt expired"), Script::Accept]);
    let tokens = ScriptedTokens::new(vec![Ok(TokenPair {
        access_token: "fresh-token".into(),
        refresh_token: "next-refresh".into(),
    })]);
    let (handle, mut events) = spawn_session(fast_config(), connector.clone(), tokens.clone());

    handle.connect("stale").await.unwrap();

    // First link saw the stale token, second the refreshed one.
    let rejected = next_link(&mut links).await;
    assert!(rejected.auth_frame.contains("stale"));
    let accepted = next_link(&mut links).await;
    assert!(accepted.auth_frame.contains("fresh-token"));

    assert_eq!(tokens.calls(), 1);
    let seen = drain_events(&mut events, Duration::from_millis(200)).await;
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::TokensRefreshed(pair) if pair.access_token == "fresh-token"
    )));
}

#[tokio::test]
async fn connect_is_idempotent_while_connected() {
    let (connector, mut links) = ScriptedConnector::new(vec![Script::Accept]);
    let (handle, _events) = spawn_session(fast_config(), connector.clone(), ScriptedTokens::none());

    handle.connect("tok").await.unwrap();
    let _link = next_link(&mut links).await;
    handle.connect("tok").await.unwrap();

    assert_eq!(connector.calls(), 1);
}

#[tokio::test]
async fn explicit_disconnect_cancels_a_scheduled_reconnect() {
    let (connector, mut links) = ScriptedConnector::new(vec![Script::Accept]);
    let config = SessionConfig {
        handshake_timeout: Duration::from_secs(1),
        policy: ReconnectPolicy::new(Duration::from_millis(100), 3),
    };
    let (handle, mut events) = spawn_session(config, connector.clone(), ScriptedTokens::none());

    handle.connect("tok").await.unwrap();
    let link = next_link(&mut links).await;
    drop(link.push);

    // Wait for the backoff to be scheduled, then pull the plug before it fires.
    let seen = drain_events(&mut events, Duration::from_millis(50)).await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, SessionEvent::Reconnecting { .. })));
    handle.disconnect();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(connector.calls(), 1, "cancelled backoff must not redial");
}

#[tokio::test]
async fn emit_while_disconnected_is_a_silent_noop() {
    let (connector, _links) = ScriptedConnector::new(vec![]);
    let (handle, _events) = spawn_session(fast_config(), connector.clone(), ScriptedTokens::none());

    handle.emit(ClientEvent::TypingStart {
        conversation_id: ConversationId::from("c1"),
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(connector.calls(), 0);
}

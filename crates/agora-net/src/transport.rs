//! Transport seam.
//!
//! The session task speaks to the wire through a [`Link`]: a pair of text
//! frame channels. [`WsConnector`] produces links backed by a
//! tokio-tungstenite WebSocket; tests script their own connector.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, warn};

use agora_shared::error::TransportError;

/// Frame channel capacity of the read/write pumps.
const PUMP_CAPACITY: usize = 64;

/// A live duplex of text frames. Dropping the link closes the transport;
/// the incoming receiver yielding `None` means the link died.
pub struct Link {
    pub outgoing: mpsc::Sender<String>,
    pub incoming: mpsc::Receiver<String>,
}

/// Opens transports. Exactly one live link exists at a time; the session
/// task enforces that by owning the only `Link`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Link, TransportError>;
}

/// Production connector: a WebSocket client against the realtime gateway.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// `url` is the full gateway endpoint including the namespace path,
    /// e.g. `wss://api.example.com/realtime`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        let (stream, _response) = connect_async(&self.url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        debug!(url = %self.url, "websocket open");

        let (mut sink, mut source) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::channel::<String>(PUMP_CAPACITY);
        let (incoming_tx, incoming) = mpsc::channel::<String>(PUMP_CAPACITY);

        // Write pump: forward frames until the session drops the sender,
        // then close the socket.
        tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Read pump: forward text frames; any close or error ends the pump
        // and, by dropping `incoming_tx`, signals the session.
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if incoming_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(reason)) => {
                        debug!(reason = ?reason, "server closed the link");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "websocket read failed");
                        break;
                    }
                }
            }
        });

        Ok(Link { outgoing, incoming })
    }
}

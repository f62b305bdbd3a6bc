//! Duplex socket seam.
//!
//! The manager only ever sees a [`SocketLink`]: a pair of channels carrying
//! text frames. [`WsConnector`] backs it with a real WebSocket; tests back it
//! with plain channels.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::ClientError;

/// An established socket. Dropping `outbound` closes the socket; `inbound`
/// yields `None` once the peer has gone away.
pub struct SocketLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
pub trait SocketConnector: Send + Sync + 'static {
    /// Whether this environment can hold persistent sockets at all.
    fn supports_sockets(&self) -> bool {
        true
    }

    async fn connect(&self, user_id: &str) -> Result<SocketLink, ClientError>;
}

/// Connects to `<server>/api/ws?userId=<id>`.
pub struct WsConnector {
    base: Url,
}

impl WsConnector {
    /// Builds a connector from the server's HTTP base URL; `http` becomes
    /// `ws` and `https` becomes `wss`.
    pub fn new(server_url: &Url) -> Result<Self, ClientError> {
        let mut base = server_url.clone();
        let scheme = match server_url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ClientError::UnsupportedScheme(other.to_string())),
        };
        base.set_scheme(scheme)
            .map_err(|()| ClientError::UnsupportedScheme(scheme.to_string()))?;
        Ok(Self { base })
    }

    pub fn endpoint(&self, user_id: &str) -> Result<Url, ClientError> {
        let mut url = self.base.join("/api/ws")?;
        url.query_pairs_mut().append_pair("userId", user_id);
        Ok(url)
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self, user_id: &str) -> Result<SocketLink, ClientError> {
        let url = self.endpoint(user_id)?;
        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::debug!("WebSocket connected: {url}");

        let (mut write, mut read) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("WebSocket read error: {e}");
                        break;
                    }
                }
            }
        });

        Ok(SocketLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

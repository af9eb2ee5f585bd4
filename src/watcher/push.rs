//! Push-mode transport: a JSON-RPC log subscription over WebSocket.
//!
//! The subscriber hands the watcher an [`mpsc::Receiver`] of raw logs.
//! Transport failure is signalled by the stream ending — the watcher
//! reacts by falling back to poll mode; it never retries the socket
//! itself.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::rpc::{RpcError, log_from_json};

/// Buffered logs between the socket reader and the watcher loop.
const SUBSCRIPTION_BUFFER: usize = 256;

/// A push-capable transport that can stream logs for a contract.
#[async_trait]
pub trait LogSubscriber: Send + Sync + std::fmt::Debug {
    /// Opens a log subscription for `contract`.
    ///
    /// The returned receiver yields logs until the transport fails, at
    /// which point it closes. Returning an error here means the
    /// subscription could not even be established.
    async fn subscribe_logs(
        &self,
        contract: &str,
    ) -> Result<mpsc::Receiver<super::rpc::RawLog>, RpcError>;
}

/// `eth_subscribe("logs")` over WebSocket.
#[derive(Debug, Clone)]
pub struct WsSubscriber {
    url: String,
}

impl WsSubscriber {
    /// Creates a subscriber against a WS JSON-RPC endpoint.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

#[async_trait]
impl LogSubscriber for WsSubscriber {
    async fn subscribe_logs(
        &self,
        contract: &str,
    ) -> Result<mpsc::Receiver<super::rpc::RawLog>, RpcError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let (mut write, mut read) = socket.split();

        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["logs", { "address": contract }],
        });
        write
            .send(Message::text(request.to_string()))
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        // The first frame answers the subscribe call itself.
        let ack = read
            .next()
            .await
            .ok_or_else(|| RpcError::Transport("socket closed during subscribe".to_string()))?
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let ack: Value = match ack {
            Message::Text(text) => serde_json::from_str(&text)
                .map_err(|e| RpcError::Decode(format!("subscribe ack: {e}")))?,
            other => {
                return Err(RpcError::Decode(format!(
                    "unexpected subscribe ack frame: {other:?}"
                )));
            }
        };
        if let Some(err) = ack.get("error") {
            return Err(RpcError::Protocol(err.to_string()));
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                    _ => break,
                };
                let Ok(notification) = serde_json::from_str::<Value>(&text) else {
                    tracing::warn!("unparseable subscription frame, skipping");
                    continue;
                };
                let Some(result) = notification.pointer("/params/result") else {
                    continue; // not a subscription notification
                };
                match log_from_json(result) {
                    Ok(log) => {
                        if tx.send(log).await.is_err() {
                            break; // watcher went away
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "bad log in subscription frame"),
                }
            }
            // Dropping tx closes the receiver; the watcher falls back
            // to poll mode.
        });

        Ok(rx)
    }
}

//! WebSocket connection task.
//!
//! Each accepted connection runs this loop as an independent task. The
//! task owns the connection's room membership and its broadcast
//! receiver; both die with the task, so disconnection cleans up without
//! touching shared state. The broadcast ring buffer is the bounded
//! outbound queue: a connection that lags past it is disconnected —
//! one slow client never stalls delivery to others.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::domain::{RelayEnvelope, RoomKey, SessionUser};
use crate::error::GatewayError;
use crate::watcher::rpc::ChainRpc;

use super::messages::{ClientMessage, ServerMessage};
use super::rooms::RoomSet;

/// Runs the read/write loop for a single WebSocket connection.
pub async fn run_connection(
    socket: WebSocket,
    mut relay_rx: broadcast::Receiver<RelayEnvelope>,
    chain: Arc<dyn ChainRpc>,
    identity: Option<SessionUser>,
    snapshot_timeout: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut rooms = RoomSet::new();

    loop {
        tokio::select! {
            // Incoming command from the client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies = handle_text_message(
                            &text,
                            &mut rooms,
                            identity.as_ref(),
                            &chain,
                            snapshot_timeout,
                        )
                        .await;
                        let mut send_failed = false;
                        for reply in replies {
                            if ws_tx.send(Message::text(reply.to_json())).await.is_err() {
                                send_failed = true;
                                break;
                            }
                        }
                        if send_failed {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Relayed event
            envelope = relay_rx.recv() => {
                match envelope {
                    Ok(envelope) => {
                        if rooms.wants(&envelope.event) {
                            let frame = ServerMessage::event(&envelope.event).to_json();
                            if ws_tx.send(Message::text(frame)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Outbound queue overflow: drop this connection
                        // only; the client resubscribes and requests a
                        // snapshot to resynchronize.
                        tracing::warn!(lagged = n, "connection overflowed, disconnecting");
                        let _ = ws_tx
                            .send(Message::text(
                                ServerMessage::error("event stream overflow, reconnect").to_json(),
                            ))
                            .await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!(joined_rooms = rooms.len(), "ws connection closed");
}

/// Dispatches one client command, returning the frames to send back.
async fn handle_text_message(
    text: &str,
    rooms: &mut RoomSet,
    identity: Option<&SessionUser>,
    chain: &Arc<dyn ChainRpc>,
    snapshot_timeout: Duration,
) -> Vec<ServerMessage> {
    let Ok(command) = serde_json::from_str::<ClientMessage>(text) else {
        return vec![ServerMessage::error("malformed message")];
    };

    match command {
        ClientMessage::Subscribe { room } => match RoomKey::parse(&room) {
            Ok(key) => {
                let name = key.to_string();
                match rooms.join(key, identity) {
                    Ok(_) => vec![ServerMessage::Subscribed { room: name }],
                    Err(e) => vec![ServerMessage::error(e.to_string())],
                }
            }
            Err(e) => vec![ServerMessage::error(GatewayError::from(e).to_string())],
        },
        ClientMessage::Unsubscribe { room } => match RoomKey::parse(&room) {
            Ok(key) => {
                rooms.leave(&key);
                vec![ServerMessage::Unsubscribed {
                    room: key.to_string(),
                }]
            }
            Err(e) => vec![ServerMessage::error(GatewayError::from(e).to_string())],
        },
        ClientMessage::RequestSnapshot { room } => {
            let key = match RoomKey::parse(&room) {
                Ok(key) => key,
                Err(e) => return vec![ServerMessage::error(GatewayError::from(e).to_string())],
            };
            let RoomKey::Token(token) = &key else {
                return vec![ServerMessage::error(
                    "snapshots are only available for token rooms",
                )];
            };
            if key.requires_identity() && identity.is_none() {
                return vec![ServerMessage::error(format!(
                    "room {key} requires authentication"
                ))];
            }
            match tokio::time::timeout(snapshot_timeout, chain.token_snapshot(token)).await {
                Ok(Ok(snapshot)) => {
                    vec![ServerMessage::snapshot(
                        serde_json::to_value(&snapshot).unwrap_or_default(),
                    )]
                }
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, %token, "snapshot read failed");
                    vec![ServerMessage::error("snapshot unavailable")]
                }
                Err(_) => vec![ServerMessage::error("snapshot timed out")],
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::watcher::rpc::{RpcError, TokenSnapshot};
    use async_trait::async_trait;

    const TOKEN: &str = "0xabc0000000000000000000000000000000000abc";

    #[derive(Debug)]
    struct MockChain {
        fails: bool,
    }

    #[async_trait]
    impl ChainRpc for MockChain {
        async fn head_block(&self) -> Result<u64, RpcError> {
            Ok(0)
        }
        async fn logs(
            &self,
            _: &str,
            _: u64,
            _: u64,
        ) -> Result<Vec<crate::watcher::rpc::RawLog>, RpcError> {
            Ok(vec![])
        }
        async fn block_timestamp(&self, _: u64) -> Result<i64, RpcError> {
            Ok(0)
        }
        async fn token_snapshot(&self, token: &str) -> Result<TokenSnapshot, RpcError> {
            if self.fails {
                return Err(RpcError::Transport("down".to_string()));
            }
            Ok(TokenSnapshot {
                token: token.to_string(),
                price: "1234".to_string(),
                total_supply: "1000000".to_string(),
            })
        }
    }

    fn chain(fails: bool) -> Arc<dyn ChainRpc> {
        Arc::new(MockChain { fails })
    }

    fn user() -> SessionUser {
        SessionUser {
            user_id: "u-1".to_string(),
            chat_platform_id: "42".to_string(),
            display_name: "ember".to_string(),
            wallet_address: "0xdead000000000000000000000000000000000001".to_string(),
        }
    }

    async fn dispatch(
        text: &str,
        rooms: &mut RoomSet,
        identity: Option<&SessionUser>,
        fails: bool,
    ) -> Vec<ServerMessage> {
        handle_text_message(text, rooms, identity, &chain(fails), Duration::from_millis(200)).await
    }

    #[tokio::test]
    async fn subscribe_acknowledges_and_joins() {
        let mut rooms = RoomSet::new();
        let replies = dispatch(
            r#"{"type":"subscribe","room":"public"}"#,
            &mut rooms,
            None,
            false,
        )
        .await;
        assert!(matches!(
            replies.as_slice(),
            [ServerMessage::Subscribed { room }] if room == "public"
        ));
        assert_eq!(rooms.len(), 1);
    }

    #[tokio::test]
    async fn anonymous_subscribe_to_token_room_errors_without_joining() {
        let mut rooms = RoomSet::new();
        let replies = dispatch(
            &format!(r#"{{"type":"subscribe","room":"token:{TOKEN}"}}"#),
            &mut rooms,
            None,
            false,
        )
        .await;
        assert!(matches!(replies.as_slice(), [ServerMessage::Error { .. }]));
        assert!(rooms.is_empty());
    }

    #[tokio::test]
    async fn identified_subscribe_to_token_room_succeeds() {
        let mut rooms = RoomSet::new();
        let identity = user();
        let replies = dispatch(
            &format!(r#"{{"type":"subscribe","room":"token:{TOKEN}"}}"#),
            &mut rooms,
            Some(&identity),
            false,
        )
        .await;
        assert!(matches!(replies.as_slice(), [ServerMessage::Subscribed { .. }]));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let mut rooms = RoomSet::new();
        let replies = dispatch(
            r#"{"type":"unsubscribe","room":"public"}"#,
            &mut rooms,
            None,
            false,
        )
        .await;
        assert!(matches!(
            replies.as_slice(),
            [ServerMessage::Unsubscribed { room }] if room == "public"
        ));
    }

    #[tokio::test]
    async fn malformed_message_errors_but_does_not_close() {
        let mut rooms = RoomSet::new();
        let replies = dispatch("not json", &mut rooms, None, false).await;
        assert!(matches!(replies.as_slice(), [ServerMessage::Error { .. }]));
    }

    #[tokio::test]
    async fn invalid_room_shape_reports_error() {
        let mut rooms = RoomSet::new();
        let replies = dispatch(
            r#"{"type":"subscribe","room":"token:xyz"}"#,
            &mut rooms,
            None,
            false,
        )
        .await;
        assert!(matches!(replies.as_slice(), [ServerMessage::Error { .. }]));
    }

    #[tokio::test]
    async fn snapshot_request_returns_event_frame() {
        let mut rooms = RoomSet::new();
        let identity = user();
        let replies = dispatch(
            &format!(r#"{{"type":"request_snapshot","room":"token:{TOKEN}"}}"#),
            &mut rooms,
            Some(&identity),
            false,
        )
        .await;
        match replies.as_slice() {
            [ServerMessage::Event { kind, payload }] => {
                assert_eq!(kind, "token_snapshot");
                assert_eq!(
                    payload.get("price").and_then(|v| v.as_str()),
                    Some("1234")
                );
            }
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    #[tokio::test]
    async fn snapshot_degrades_to_error_when_chain_is_down() {
        let mut rooms = RoomSet::new();
        let identity = user();
        let replies = dispatch(
            &format!(r#"{{"type":"request_snapshot","room":"token:{TOKEN}"}}"#),
            &mut rooms,
            Some(&identity),
            true,
        )
        .await;
        assert!(matches!(replies.as_slice(), [ServerMessage::Error { .. }]));
    }

    #[tokio::test]
    async fn snapshot_of_non_token_room_rejected() {
        let mut rooms = RoomSet::new();
        let replies = dispatch(
            r#"{"type":"request_snapshot","room":"public"}"#,
            &mut rooms,
            None,
            false,
        )
        .await;
        assert!(matches!(replies.as_slice(), [ServerMessage::Error { .. }]));
    }
}

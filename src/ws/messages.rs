//! WebSocket wire protocol: client commands and server frames.

use serde::{Deserialize, Serialize};

use crate::domain::DomainEvent;

/// Commands a client can send over the socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room. Idempotent on duplicate joins.
    Subscribe {
        /// Room key, e.g. `"public"`, `"token:0x…"`, `"topic:trades"`.
        room: String,
    },
    /// Leave a room. Idempotent when not joined.
    Unsubscribe {
        /// Room key.
        room: String,
    },
    /// Request the current state snapshot backing a token room, used to
    /// resynchronize after a reconnect.
    RequestSnapshot {
        /// Room key; must be a `token:` room.
        room: String,
    },
}

/// Frames the server sends to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A relayed domain event matching one of the connection's rooms.
    Event {
        /// Event kind discriminator.
        kind: String,
        /// Full event payload.
        payload: serde_json::Value,
    },
    /// Acknowledges a subscribe.
    Subscribed {
        /// Room key joined.
        room: String,
    },
    /// Acknowledges an unsubscribe.
    Unsubscribed {
        /// Room key left.
        room: String,
    },
    /// A command failed; the connection stays open.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// Wraps a domain event for delivery.
    #[must_use]
    pub fn event(event: &DomainEvent) -> Self {
        Self::Event {
            kind: event.kind_str().to_string(),
            payload: serde_json::to_value(event).unwrap_or_default(),
        }
    }

    /// Wraps an out-of-band snapshot as an event frame.
    #[must_use]
    pub fn snapshot(payload: serde_json::Value) -> Self {
        Self::Event {
            kind: "token_snapshot".to_string(),
            payload,
        }
    }

    /// Builds an error frame.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serializes the frame to its wire form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::EventKind;

    #[test]
    fn parses_subscribe_command() {
        let msg: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"subscribe","room":"public"}"#);
        assert!(matches!(
            msg,
            Ok(ClientMessage::Subscribe { room }) if room == "public"
        ));
    }

    #[test]
    fn parses_request_snapshot_command() {
        let msg: Result<ClientMessage, _> = serde_json::from_str(
            r#"{"type":"request_snapshot","room":"token:0xabc0000000000000000000000000000000000abc"}"#,
        );
        assert!(matches!(msg, Ok(ClientMessage::RequestSnapshot { .. })));
    }

    #[test]
    fn rejects_unknown_command() {
        let msg: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"shout","room":"public"}"#);
        assert!(msg.is_err());
    }

    #[test]
    fn event_frame_carries_kind_and_payload() {
        let event = DomainEvent {
            kind: EventKind::RevenueDistributed {
                amount: "9000".to_string(),
            },
            block_number: 7,
            block_timestamp: 0,
            tx_hash: "0x22bb".to_string(),
            log_index: 0,
        };
        let json = ServerMessage::event(&event).to_json();
        assert!(json.contains("\"type\":\"event\""));
        assert!(json.contains("\"kind\":\"revenue_distributed\""));
        assert!(json.contains("0x22bb"));
    }

    #[test]
    fn error_frame_shape() {
        let json = ServerMessage::error("nope").to_json();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"message\":\"nope\""));
    }
}

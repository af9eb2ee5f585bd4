//! Room keys: the named interest groups connections join.
//!
//! A room key is one of `public`, `token:<address>`, `user:<address>`,
//! or `topic:<name>`. Rooms are connection-scoped only; they are never
//! persisted and are rebuilt by the client on reconnect.

use std::fmt;

use serde::Serialize;

use super::event::{DomainEvent, EventKind};

/// Topic names the gateway accepts for `topic:` rooms.
pub const KNOWN_TOPICS: [&str; 4] = ["trades", "launches", "staking", "platform"];

/// A named interest group a connection can join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum RoomKey {
    /// Every connection may join; receives all events.
    Public,
    /// Events about one token. Requires an authenticated identity.
    Token(String),
    /// Events involving one wallet. Requires the matching identity.
    User(String),
    /// A curated event category (see [`KNOWN_TOPICS`]).
    Topic(String),
}

/// Why a room key string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomKeyError {
    /// The string did not match any known room shape.
    #[error("unknown room key shape: {0}")]
    UnknownShape(String),
    /// A `token:`/`user:` address did not match `0x` + 40 hex chars.
    #[error("invalid address in room key: {0}")]
    InvalidAddress(String),
    /// A `topic:` name is not one of [`KNOWN_TOPICS`].
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
}

impl RoomKey {
    /// Parses and validates a room key string.
    ///
    /// Addresses are lowercased so that room membership is
    /// case-insensitive on the hex portion.
    ///
    /// # Errors
    ///
    /// Returns a [`RoomKeyError`] when the shape, address, or topic
    /// is invalid.
    pub fn parse(raw: &str) -> Result<Self, RoomKeyError> {
        if raw == "public" {
            return Ok(Self::Public);
        }
        if let Some(addr) = raw.strip_prefix("token:") {
            return parse_address(addr).map(Self::Token);
        }
        if let Some(addr) = raw.strip_prefix("user:") {
            return parse_address(addr).map(Self::User);
        }
        if let Some(topic) = raw.strip_prefix("topic:") {
            if KNOWN_TOPICS.contains(&topic) {
                return Ok(Self::Topic(topic.to_string()));
            }
            return Err(RoomKeyError::UnknownTopic(topic.to_string()));
        }
        Err(RoomKeyError::UnknownShape(raw.to_string()))
    }

    /// Returns `true` if joining this room requires an authenticated
    /// identity. Anonymous connections are restricted to `public` and
    /// `topic:` rooms.
    #[must_use]
    pub const fn requires_identity(&self) -> bool {
        matches!(self, Self::Token(_) | Self::User(_))
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Token(addr) => write!(f, "token:{addr}"),
            Self::User(addr) => write!(f, "user:{addr}"),
            Self::Topic(name) => write!(f, "topic:{name}"),
        }
    }
}

impl From<RoomKey> for String {
    fn from(key: RoomKey) -> Self {
        key.to_string()
    }
}

fn parse_address(raw: &str) -> Result<String, RoomKeyError> {
    let hex_part = raw.strip_prefix("0x").unwrap_or("");
    if hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(raw.to_ascii_lowercase())
    } else {
        Err(RoomKeyError::InvalidAddress(raw.to_string()))
    }
}

/// Returns the topic room name for an event kind.
const fn topic_for(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::TokenTraded { .. } => "trades",
        EventKind::TokenCreated { .. } | EventKind::TokenLaunched { .. } => "launches",
        EventKind::Staked { .. } | EventKind::Unstaked { .. } | EventKind::RewardsClaimed { .. } => {
            "staking"
        }
        EventKind::RevenueDistributed { .. } | EventKind::TierChanged { .. } => "platform",
    }
}

/// Computes the set of rooms an event is delivered to: always `public`
/// plus the relevant topic room, `token:<addr>` when the event carries a
/// token subject, and `user:<addr>` for each identified counterpart.
#[must_use]
pub fn target_rooms(event: &DomainEvent) -> Vec<RoomKey> {
    let mut rooms = vec![
        RoomKey::Public,
        RoomKey::Topic(topic_for(&event.kind).to_string()),
    ];
    if let Some(token) = event.token() {
        rooms.push(RoomKey::Token(token.to_ascii_lowercase()));
    }
    for addr in event.counterparties() {
        rooms.push(RoomKey::User(addr.to_ascii_lowercase()));
    }
    rooms
}

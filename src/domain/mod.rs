//! Domain layer: events, channels, rooms, sessions, and the relay.
//!
//! This module contains the server-side domain model: normalized chain
//! events and their channel taxonomy, room keys for interest grouping,
//! session/handshake records, and the broadcast relay that decouples
//! the chain watcher from gateway connections.

pub mod event;
pub mod relay;
pub mod room;
pub mod session;

pub use event::{Channel, DomainEvent, EventId, EventKind, TradeSide};
pub use relay::{ChannelSubscription, EventRelay, RelayEnvelope};
pub use room::{RoomKey, RoomKeyError, target_rooms};
pub use session::{HandshakeCode, SessionRecord, SessionUser};

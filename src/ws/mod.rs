//! WebSocket layer: connection handling, room membership, fan-out.
//!
//! The WebSocket endpoint at `/ws` delivers relayed domain events to
//! connections grouped by room, with authentication resolved before
//! the upgrade completes.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod rooms;

//! # ember-gateway
//!
//! Real-time event relay and cross-channel session bridge for the
//! Ember token launchpad.
//!
//! The gateway watches launchpad contract activity, normalizes it into
//! typed domain events, and fans those events out to WebSocket clients
//! grouped by room. It also bridges chat-bot authentication into web
//! sessions through single-use handshake codes. Token metadata CRUD,
//! price tiers, and the historical trade store are external
//! collaborators — this service notifies, it is never the system of
//! record.
//!
//! ## Architecture
//!
//! ```text
//! Chain (JSON-RPC push/poll)
//!     │
//!     ├── ChainWatcher (watcher/)
//!     │
//!     ├── EventRelay (domain/)
//!     │
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Connections (ws/)
//!     │
//!     ├── SessionBridge (session/)
//!     │
//!     └── Shared store: Redis (store/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod session;
pub mod store;
pub mod watcher;
pub mod ws;

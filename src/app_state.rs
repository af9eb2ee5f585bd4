//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::EventRelay;
use crate::session::SessionBridge;
use crate::watcher::rpc::ChainRpc;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Session bridge for all auth operations.
    pub bridge: Arc<SessionBridge>,
    /// Event relay WebSocket connections subscribe to.
    pub relay: EventRelay,
    /// Chain reader for on-demand token snapshots.
    pub chain: Arc<dyn ChainRpc>,
    /// Budget for snapshot reads served to clients.
    pub snapshot_timeout: Duration,
}

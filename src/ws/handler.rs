//! Axum WebSocket upgrade handler with pre-join authentication.
//!
//! Authentication is the one synchronous step of the connection
//! lifecycle: it completes (or fails) before the upgrade, so a
//! connection never joins any room with unchecked credentials. A
//! missing token is allowed — the connection proceeds anonymously,
//! restricted to public/topic rooms. An invalid or expired token is
//! rejected with 401, never silently downgraded.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::GatewayError;

use super::connection::run_connection;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Bearer token; browsers that cannot set headers on WebSocket
    /// upgrades pass it here instead.
    pub token: Option<String>,
}

/// `GET /ws` — upgrade to WebSocket, optionally authenticated.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthorized`] when a presented token fails
/// validation (bad signature, expired, or revoked session).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let token = bearer_token(&headers).or(query.token);
    let identity = match token {
        Some(token) => Some(state.bridge.validate(&token).await?),
        None => None,
    };

    let relay_rx = state.relay.subscribe_all();
    let chain = Arc::clone(&state.chain);
    let snapshot_timeout = state.snapshot_timeout;

    Ok(ws.on_upgrade(move |socket| {
        run_connection(socket, relay_rx, chain, identity, snapshot_timeout)
    }))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

//! Session-bridge handlers: handshake issuance and redemption, session
//! validation, token refresh, logout.

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{RedeemRequest, RefreshRequest, RefreshResponse, SessionResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::session::{BridgeTokens, IssuedCode};

/// `POST /auth/handshake` — Issue a single-use handshake code.
///
/// # Errors
///
/// Returns [`GatewayError`] if the store write fails.
#[utoipa::path(
    post,
    path = "/api/v1/auth/handshake",
    tag = "Auth",
    summary = "Issue a handshake code",
    description = "Issues a short-lived, single-use code the chat bot hands to a user as a deep link into the web client.",
    responses(
        (status = 200, description = "Code issued", body = IssuedCode),
        (status = 500, description = "Store failure", body = ErrorResponse),
    )
)]
pub async fn issue_handshake(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let issued = state.bridge.issue_code().await?;
    Ok((StatusCode::OK, Json(issued)))
}

/// `POST /auth/redeem` — Redeem a handshake code for a token pair.
///
/// # Errors
///
/// Returns a 401 [`GatewayError`] with a distinguishable reason:
/// `not_found`, `already_used`, `expired`, or `proof_invalid`.
#[utoipa::path(
    post,
    path = "/api/v1/auth/redeem",
    tag = "Auth",
    summary = "Redeem a handshake code",
    description = "Exchanges a valid code plus chat-platform proof for an access/refresh token pair. Single-use: concurrent redemptions of one code admit exactly one winner.",
    request_body = RedeemRequest,
    responses(
        (status = 200, description = "Session established", body = BridgeTokens),
        (status = 401, description = "Code not found / already used / expired, or invalid proof", body = ErrorResponse),
    )
)]
pub async fn redeem_handshake(
    State(state): State<AppState>,
    Json(req): Json<RedeemRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let tokens = state
        .bridge
        .redeem_code(
            &req.code,
            &req.chat_platform_id,
            &req.proof,
            &req.wallet_address,
            &req.display_name,
        )
        .await?;
    Ok((StatusCode::OK, Json(tokens)))
}

/// `GET /auth/session` — Validate the presented access token.
///
/// # Errors
///
/// Returns 401 when the token is invalid, expired, or its session
/// record has been revoked.
#[utoipa::path(
    get,
    path = "/api/v1/auth/session",
    tag = "Auth",
    summary = "Validate the current session",
    description = "Verifies the bearer access token and re-checks the canonical session record; revocation invalidates tokens before their embedded expiry.",
    responses(
        (status = 200, description = "Token valid", body = SessionResponse),
        (status = 401, description = "Invalid token or revoked session", body = ErrorResponse),
    )
)]
pub async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, GatewayError> {
    let token = bearer_token(&headers)?;
    let user = state.bridge.validate(&token).await?;
    Ok((StatusCode::OK, Json(SessionResponse { user })))
}

/// `POST /auth/refresh` — Mint a new access token from a refresh token.
///
/// # Errors
///
/// Returns 401 when the refresh token is invalid or the session record
/// no longer exists.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    summary = "Refresh the access token",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Invalid refresh token or revoked session", body = ErrorResponse),
    )
)]
pub async fn refresh_session(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let access_token = state.bridge.refresh(&req.refresh_token).await?;
    Ok((StatusCode::OK, Json(RefreshResponse { access_token })))
}

/// `POST /auth/logout` — Revoke the session behind the presented token.
///
/// # Errors
///
/// Returns 401 when the token is invalid or already revoked.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    summary = "Log out",
    description = "Deletes the canonical session record. Every previously issued token for this user fails validation immediately.",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Invalid token", body = ErrorResponse),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, GatewayError> {
    let token = bearer_token(&headers)?;
    let user = state.bridge.validate(&token).await?;
    state.bridge.revoke(&user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn bearer_token(headers: &HeaderMap) -> Result<String, GatewayError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or_else(|| GatewayError::Unauthorized("missing bearer token".to_string()))
}

/// Auth routes mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/handshake", post(issue_handshake))
        .route("/auth/redeem", post(redeem_handshake))
        .route("/auth/session", get(current_session))
        .route("/auth/refresh", post(refresh_session))
        .route("/auth/logout", post(logout))
}

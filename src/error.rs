//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each
//! variant maps to a specific HTTP status code and structured JSON
//! error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::store::{RedeemError, StoreError};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2202,
///     "message": "handshake code already used",
///     "details": "already_used"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges below).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                |
/// |-----------|-----------------|----------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request            |
/// | 2100–2199 | Authentication  | 401 Unauthorized           |
/// | 2200–2299 | Handshake       | 401 Unauthorized           |
/// | 3000–3999 | Server/Upstream | 5xx                        |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A room key failed shape or topic validation.
    #[error("invalid room key: {0}")]
    InvalidRoom(String),

    /// Missing, malformed, expired, or revoked credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No live handshake code and no recent tombstone under that value.
    #[error("handshake code not found")]
    CodeNotFound,

    /// The handshake code was already consumed.
    #[error("handshake code already used")]
    CodeAlreadyUsed,

    /// The handshake code's deadline passed before redemption.
    #[error("handshake code expired")]
    CodeExpired,

    /// The chat-platform proof did not verify.
    #[error("invalid chat-platform proof")]
    ProofInvalid,

    /// Shared store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Chain RPC failure surfaced to a client (snapshot requests).
    #[error("chain rpc error: {0}")]
    Rpc(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidRoom(_) => 1002,
            Self::Unauthorized(_) => 2101,
            Self::CodeNotFound => 2201,
            Self::CodeAlreadyUsed => 2202,
            Self::CodeExpired => 2203,
            Self::ProofInvalid => 2204,
            Self::Internal(_) => 3000,
            Self::Store(_) => 3001,
            Self::Rpc(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidRoom(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_)
            | Self::CodeNotFound
            | Self::CodeAlreadyUsed
            | Self::CodeExpired
            | Self::ProofInvalid => StatusCode::UNAUTHORIZED,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Rpc(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the stable machine-readable reason string used on both
    /// the HTTP and WebSocket surfaces.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidRoom(_) => "invalid_room",
            Self::Unauthorized(_) => "unauthorized",
            Self::CodeNotFound => "not_found",
            Self::CodeAlreadyUsed => "already_used",
            Self::CodeExpired => "expired",
            Self::ProofInvalid => "proof_invalid",
            Self::Store(_) => "store_error",
            Self::Rpc(_) => "rpc_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<crate::domain::RoomKeyError> for GatewayError {
    fn from(e: crate::domain::RoomKeyError) -> Self {
        Self::InvalidRoom(e.to_string())
    }
}

impl From<RedeemError> for GatewayError {
    fn from(e: RedeemError) -> Self {
        match e {
            RedeemError::NotFound => Self::CodeNotFound,
            RedeemError::AlreadyUsed => Self::CodeAlreadyUsed,
            RedeemError::Expired => Self::CodeExpired,
            RedeemError::Store(inner) => Self::Store(inner.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: Some(self.reason().to_string()),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

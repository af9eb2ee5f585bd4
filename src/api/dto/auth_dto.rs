//! DTOs for the session-bridge endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::SessionUser;

/// Body of `POST /auth/redeem`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RedeemRequest {
    /// The handshake code obtained from the chat bot.
    pub code: String,
    /// The user's identity on the chat platform.
    pub chat_platform_id: String,
    /// HMAC proof produced by the bot side.
    pub proof: String,
    /// Wallet address to bind the session to (`0x…`).
    pub wallet_address: String,
    /// Display name shown in both front-ends.
    pub display_name: String,
}

/// Body of `POST /auth/refresh`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RefreshRequest {
    /// A refresh token from a previous redemption.
    pub refresh_token: String,
}

/// Response of `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefreshResponse {
    /// A freshly minted access token.
    pub access_token: String,
}

/// Response of `GET /auth/session`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionResponse {
    /// The identity the presented token resolves to.
    #[schema(value_type = Object)]
    pub user: SessionUser,
}

//! The session bridge: one-time handshake codes and the canonical
//! session record shared by the chat-bot and web front-ends.
//!
//! A user who authenticated with the bot asks it for a handshake code,
//! opens the deep link in the web client, and the web client redeems
//! the code for an access/refresh token pair — without re-proving
//! identity. The code is single-use (atomic check-and-set in the shared
//! store) and short-lived.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{HandshakeCode, SessionRecord, SessionUser};
use crate::error::GatewayError;
use crate::store::SharedStore;

use super::proof;
use super::token::{TokenSigner, TokenType};

/// Code alphabet with visually ambiguous characters removed.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";

/// Length of generated handshake codes.
const CODE_LEN: usize = 12;

/// Tunables for the session bridge, derived from gateway configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How long an issued code stays redeemable.
    pub code_ttl: Duration,
    /// How long a consumed/lapsed code still reports a precise reason.
    pub code_grace: Duration,
    /// Lifetime of the canonical session record.
    pub session_ttl: Duration,
    /// Lifetime of minted access tokens.
    pub access_ttl: Duration,
    /// Lifetime of minted refresh tokens.
    pub refresh_ttl: Duration,
    /// Base URL the deep link points the web client at.
    pub deep_link_base: String,
    /// Secret shared with the chat-bot side for proof verification.
    pub proof_secret: String,
}

/// A freshly issued handshake code, as returned to the bot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssuedCode {
    /// The opaque single-use code.
    pub code: String,
    /// Deep link the bot hands to the user.
    pub deep_link: String,
    /// Seconds until the code expires.
    pub expires_in: u64,
}

/// Token pair and identity returned by a successful redemption.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BridgeTokens {
    /// Signed access token (present on every subsequent request).
    pub access_token: String,
    /// Signed refresh token (re-mints access tokens).
    pub refresh_token: String,
    /// The identity both tokens are bound to.
    #[schema(value_type = Object)]
    pub user: SessionUser,
}

/// Issues and redeems handshake codes, owns the canonical session
/// record, and mints/validates/refreshes the tokens derived from it.
#[derive(Debug, Clone)]
pub struct SessionBridge {
    store: Arc<dyn SharedStore>,
    signer: Arc<TokenSigner>,
    config: BridgeConfig,
}

impl SessionBridge {
    /// Creates a new bridge over the shared store.
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, signer: TokenSigner, config: BridgeConfig) -> Self {
        Self {
            store,
            signer: Arc::new(signer),
            config,
        }
    }

    /// Issues a fresh single-use handshake code.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the store write fails.
    pub async fn issue_code(&self) -> Result<IssuedCode, GatewayError> {
        let code = generate_code();
        let record = HandshakeCode::issue(code.clone(), Utc::now(), self.config.code_ttl);
        self.store
            .put_code(&record, self.config.code_ttl + self.config.code_grace)
            .await?;

        tracing::debug!(expires_in = self.config.code_ttl.num_seconds(), "code issued");
        Ok(IssuedCode {
            deep_link: format!("{}?code={code}", self.config.deep_link_base),
            code,
            expires_in: self.config.code_ttl.num_seconds().max(0) as u64,
        })
    }

    /// Redeems a handshake code for a token pair.
    ///
    /// The proof is checked before the code is consumed, so a forged
    /// request cannot burn someone else's code. The code transition to
    /// used is atomic in the store: of concurrent redemptions exactly
    /// one reaches the session-creation step.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ProofInvalid`], [`GatewayError::CodeNotFound`],
    /// [`GatewayError::CodeAlreadyUsed`], or [`GatewayError::CodeExpired`] —
    /// each reason distinguishable by the client.
    pub async fn redeem_code(
        &self,
        code: &str,
        chat_platform_id: &str,
        proof: &str,
        wallet_address: &str,
        display_name: &str,
    ) -> Result<BridgeTokens, GatewayError> {
        if !proof::verify(&self.config.proof_secret, code, chat_platform_id, proof) {
            return Err(GatewayError::ProofInvalid);
        }
        let wallet = normalize_wallet(wallet_address)?;

        self.store
            .redeem_code(code, self.config.code_grace)
            .await?;

        // Re-login keeps the canonical record: one record per user,
        // whichever front-end signed in first.
        let user_id = match self.store.session_by_platform(chat_platform_id).await? {
            Some(existing) => existing.user_id,
            None => Uuid::new_v4().to_string(),
        };

        let now = Utc::now();
        let record = SessionRecord {
            user_id,
            chat_platform_id: chat_platform_id.to_string(),
            display_name: display_name.to_string(),
            wallet_address: wallet,
            issued_at: now,
            expires_at: now + self.config.session_ttl,
        };
        self.store.put_session(&record).await?;

        let access_token = self
            .signer
            .mint(&record, TokenType::Access, self.config.access_ttl)?;
        let refresh_token = self
            .signer
            .mint(&record, TokenType::Refresh, self.config.refresh_ttl)?;

        tracing::info!(user_id = %record.user_id, "handshake code redeemed");
        Ok(BridgeTokens {
            access_token,
            refresh_token,
            user: SessionUser::from(&record),
        })
    }

    /// Validates an access token against both its signature and the
    /// continued existence of the session record.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] if the token fails
    /// verification or the record was revoked — even a structurally
    /// valid, unexpired token dies with its record.
    pub async fn validate(&self, access_token: &str) -> Result<SessionUser, GatewayError> {
        let claims = self.signer.verify(access_token, TokenType::Access)?;
        let record = self
            .store
            .session_by_user(&claims.sub)
            .await?
            .ok_or_else(|| GatewayError::Unauthorized("session revoked".to_string()))?;
        Ok(SessionUser::from(&record))
    }

    /// Mints a fresh access token from a refresh token, as long as the
    /// session record still exists.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] on a bad refresh token or
    /// a revoked session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, GatewayError> {
        let claims = self.signer.verify(refresh_token, TokenType::Refresh)?;
        let record = self
            .store
            .session_by_user(&claims.sub)
            .await?
            .ok_or_else(|| GatewayError::Unauthorized("session revoked".to_string()))?;
        self.signer
            .mint(&record, TokenType::Access, self.config.access_ttl)
    }

    /// Deletes the session record (logout). Every token derived from it
    /// fails validation from this point on.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the store delete fails.
    pub async fn revoke(&self, user_id: &str) -> Result<bool, GatewayError> {
        let removed = self.store.delete_session(user_id).await?;
        if removed {
            tracing::info!(%user_id, "session revoked");
        }
        Ok(removed)
    }
}

/// Periodically clears lapsed handshake codes and session records.
///
/// Defense in depth next to the store's native TTL: the expiry checks
/// at redemption/validation time are authoritative either way.
pub async fn run_sweeper(store: Arc<dyn SharedStore>, interval: StdDuration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match store.sweep_expired().await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "swept expired entries"),
            Err(e) => tracing::warn!(error = %e, "sweep failed"),
        }
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| {
            CODE_ALPHABET
                .choose(&mut rng)
                .copied()
                .unwrap_or(b'E') as char
        })
        .collect()
}

fn normalize_wallet(wallet: &str) -> Result<String, GatewayError> {
    let hex_part = wallet.strip_prefix("0x").unwrap_or("");
    if hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(wallet.to_ascii_lowercase())
    } else {
        Err(GatewayError::InvalidRequest(format!(
            "invalid wallet address: {wallet}"
        )))
    }
}

//! Signed session and refresh tokens.
//!
//! Tokens are HS256 JWTs carrying the session identity claims. A token
//! is only ever as valid as the [`SessionRecord`] it was derived from:
//! signature verification here is the first gate, the record lookup in
//! [`super::SessionBridge`] is the second.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::domain::SessionRecord;
use crate::error::GatewayError;

/// Discriminates access tokens from refresh tokens so one can never be
/// presented in place of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived token presented on every request.
    Access,
    /// Longer-lived token that can re-mint access tokens.
    Refresh,
}

/// JWT claims embedded in both token types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Internal user id.
    pub sub: String,
    /// Chat-platform identity.
    pub chat_platform_id: String,
    /// Wallet address (`0x…`, lowercased).
    pub wallet_address: String,
    /// Display name.
    pub display_name: String,
    /// Access or refresh.
    pub token_type: TokenType,
    /// Issued-at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
}

/// Mints and verifies HS256 session tokens.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Creates a signer from the shared HMAC secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; the session bridge's guarantees depend on it.
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Mints a token of the given type for a session record.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if encoding fails.
    pub fn mint(
        &self,
        record: &SessionRecord,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<String, GatewayError> {
        let now = Utc::now();
        let claims = Claims {
            sub: record.user_id.clone(),
            chat_platform_id: record.chat_platform_id.clone(),
            wallet_address: record.wallet_address.clone(),
            display_name: record.display_name.clone(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&jsonwebtoken::Header::default(), &claims, &self.encoding)
            .map_err(|e| GatewayError::Internal(format!("token encode: {e}")))
    }

    /// Verifies signature, expiry, and token type.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] on any signature, expiry,
    /// or type failure — callers never learn which beyond the message.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, GatewayError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| GatewayError::Unauthorized(format!("invalid token: {e}")))?;
        if data.claims.token_type != expected {
            return Err(GatewayError::Unauthorized(
                "wrong token type for this operation".to_string(),
            ));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            user_id: "u-1".to_string(),
            chat_platform_id: "42".to_string(),
            display_name: "ember".to_string(),
            wallet_address: "0xabc0000000000000000000000000000000000abc".to_string(),
            issued_at: now,
            expires_at: now + Duration::days(30),
        }
    }

    #[test]
    fn mint_and_verify_access_token() {
        let signer = TokenSigner::new("test-secret");
        let token = signer.mint(&record(), TokenType::Access, Duration::days(7));
        let Ok(token) = token else {
            panic!("mint failed");
        };
        let claims = signer.verify(&token, TokenType::Access);
        let Ok(claims) = claims else {
            panic!("verify failed");
        };
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.chat_platform_id, "42");
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_token_rejected_where_access_expected() {
        let signer = TokenSigner::new("test-secret");
        let token = signer
            .mint(&record(), TokenType::Refresh, Duration::days(30))
            .unwrap_or_default();
        assert!(signer.verify(&token, TokenType::Access).is_err());
        assert!(signer.verify(&token, TokenType::Refresh).is_ok());
    }

    #[test]
    fn tampered_token_rejected() {
        let signer = TokenSigner::new("test-secret");
        let token = signer
            .mint(&record(), TokenType::Access, Duration::days(7))
            .unwrap_or_default();
        let tampered = format!("{token}x");
        assert!(signer.verify(&tampered, TokenType::Access).is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let signer = TokenSigner::new("test-secret");
        let other = TokenSigner::new("other-secret");
        let token = signer
            .mint(&record(), TokenType::Access, Duration::days(7))
            .unwrap_or_default();
        assert!(other.verify(&token, TokenType::Access).is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let signer = TokenSigner::new("test-secret");
        let token = signer
            .mint(&record(), TokenType::Access, Duration::seconds(-5))
            .unwrap_or_default();
        assert!(signer.verify(&token, TokenType::Access).is_err());
    }
}

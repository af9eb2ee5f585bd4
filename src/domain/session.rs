//! Session and handshake records shared by both front-ends.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Canonical server-side record of an authenticated identity.
///
/// Exactly one record exists per `user_id`, indexed in the shared store
/// by both `user_id` and `chat_platform_id` with write-through
/// consistency. Tokens are derived from this record; deleting it
/// invalidates every derived token immediately, regardless of the
/// token's own remaining signature validity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Internal user identifier (UUID v4, assigned on first login).
    pub user_id: String,
    /// Identity on the chat platform (bot side).
    pub chat_platform_id: String,
    /// Display name shown in both front-ends.
    pub display_name: String,
    /// Wallet address tied to the identity (`0x…`, lowercased).
    pub wallet_address: String,
    /// When this record was created or last refreshed.
    pub issued_at: DateTime<Utc>,
    /// When this record lapses if not refreshed or revoked earlier.
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Returns `true` if the record's own TTL has lapsed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Short-lived, single-use credential bridging chat-bot authentication
/// to a web session.
///
/// The `CREATED → REDEEMED` transition is an atomic check-and-set in
/// the shared store; `CREATED → EXPIRED` is passive, checked against
/// `expires_at` at redemption time and reinforced by a periodic sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeCode {
    /// The opaque code value handed to the chat platform.
    pub code: String,
    /// Issue time.
    pub created_at: DateTime<Utc>,
    /// Expiry deadline; redemption at or after this instant fails.
    pub expires_at: DateTime<Utc>,
    /// Whether the code has been consumed.
    pub used: bool,
}

impl HandshakeCode {
    /// Creates a fresh, unused code valid for `ttl` starting at `now`.
    #[must_use]
    pub fn issue(code: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            code,
            created_at: now,
            expires_at: now + ttl,
            used: false,
        }
    }

    /// Returns `true` if the code's deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// The identity attached to a validated token, as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Internal user identifier.
    pub user_id: String,
    /// Identity on the chat platform.
    pub chat_platform_id: String,
    /// Display name.
    pub display_name: String,
    /// Wallet address (`0x…`, lowercased).
    pub wallet_address: String,
}

impl From<&SessionRecord> for SessionUser {
    fn from(record: &SessionRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            chat_platform_id: record.chat_platform_id.clone(),
            display_name: record.display_name.clone(),
            wallet_address: record.wallet_address.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_code_expires_at_created_plus_ttl() {
        let now = Utc::now();
        let code = HandshakeCode::issue("EMB3RC0DE".to_string(), now, Duration::seconds(300));
        assert_eq!(code.expires_at, now + Duration::seconds(300));
        assert!(!code.used);
        assert!(!code.is_expired(now + Duration::seconds(299)));
        assert!(code.is_expired(now + Duration::seconds(300)));
        assert!(code.is_expired(now + Duration::seconds(301)));
    }

    #[test]
    fn session_user_mirrors_record_identity() {
        let now = Utc::now();
        let record = SessionRecord {
            user_id: "u-1".to_string(),
            chat_platform_id: "42".to_string(),
            display_name: "ember".to_string(),
            wallet_address: "0xabc".to_string(),
            issued_at: now,
            expires_at: now + Duration::days(30),
        };
        let user = SessionUser::from(&record);
        assert_eq!(user.user_id, "u-1");
        assert_eq!(user.chat_platform_id, "42");
        assert!(!record.is_expired(now));
    }
}

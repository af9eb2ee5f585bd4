//! Shared TTL-backed key-value store.
//!
//! One store is concurrently accessed by the chain watcher (cursor
//! read/write), the connection gateway (session reads), and the session
//! bridge (session/handshake read-write). Handshake redemption is an
//! atomic check-and-set, never read-then-write, so concurrent
//! redemptions cannot both succeed.
//!
//! [`RedisStore`] is the production backend; [`MemoryStore`] backs tests
//! and single-process development runs.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::Duration;

use crate::domain::{HandshakeCode, SessionRecord};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Failure talking to or reading from the shared store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or the command failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A stored value could not be decoded.
    #[error("corrupt store entry: {0}")]
    Corrupt(String),
}

/// Outcome of a failed handshake-code redemption, distinguishable so the
/// client can tell "retry" from "already consumed".
#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    /// No live code and no recent tombstone under that value.
    #[error("handshake code not found")]
    NotFound,
    /// The code was already consumed by an earlier redemption.
    #[error("handshake code already used")]
    AlreadyUsed,
    /// The code's deadline passed before redemption.
    #[error("handshake code expired")]
    Expired,
    /// The store itself failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The key-value store shared by watcher, gateway, and session bridge.
///
/// Implementations must uphold two atomicity guarantees:
/// - [`redeem_code`](SharedStore::redeem_code) is a check-and-set: of any
///   number of concurrent calls for one code, exactly one succeeds.
/// - Session records are dual-keyed (`user_id` and `chat_platform_id`);
///   both keys are written and deleted together.
#[async_trait]
pub trait SharedStore: Send + Sync + std::fmt::Debug {
    /// Verifies the store is reachable. Called once at startup; failure
    /// there is fatal to the process.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Writes (or overwrites) the canonical session record under both
    /// its `user_id` and `chat_platform_id` keys, with TTL derived from
    /// the record's `expires_at`.
    async fn put_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Looks up a session by internal user id. Expired records read as
    /// absent.
    async fn session_by_user(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Looks up a session by chat-platform id. Expired records read as
    /// absent.
    async fn session_by_platform(
        &self,
        chat_platform_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Deletes a session record and its secondary index entry. Returns
    /// `true` if a record existed.
    async fn delete_session(&self, user_id: &str) -> Result<bool, StoreError>;

    /// Stores a freshly issued handshake code. The entry is retained for
    /// `retain` (code TTL plus the tombstone grace window) so that late
    /// redemption attempts can still report a precise failure reason.
    async fn put_code(&self, code: &HandshakeCode, retain: Duration) -> Result<(), StoreError>;

    /// Atomically redeems a handshake code.
    ///
    /// Exactly one concurrent caller receives `Ok`; every other caller
    /// observes [`RedeemError::AlreadyUsed`]. A code past its deadline
    /// yields [`RedeemError::Expired`] for `grace` after expiry and
    /// [`RedeemError::NotFound`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns a [`RedeemError`] describing why redemption failed.
    async fn redeem_code(&self, code: &str, grace: Duration) -> Result<HandshakeCode, RedeemError>;

    /// Reads the last fully-processed block for a watched contract.
    async fn cursor(&self, contract: &str) -> Result<Option<u64>, StoreError>;

    /// Persists the last fully-processed block for a watched contract.
    /// Called only after every event in the batch has been forwarded.
    async fn set_cursor(&self, contract: &str, block: u64) -> Result<(), StoreError>;

    /// Removes entries whose retention lapsed. Backends with native TTL
    /// may make this a no-op. Returns the number of entries removed.
    async fn sweep_expired(&self) -> Result<u64, StoreError>;
}

//! Redis implementation of the shared store.
//!
//! Key layout:
//! - `session:user:{user_id}` → JSON [`SessionRecord`]
//! - `session:chat:{chat_platform_id}` → `user_id` (secondary index)
//! - `hs:code:{code}` → JSON [`HandshakeCode`]
//! - `hs:gone:{code}` → `"used"` | `"expired"` (grace-TTL tombstone)
//! - `watch:cursor:{contract}` → last fully-processed block number
//!
//! Redemption atomicity comes from single-command `GETDEL`: of any
//! number of concurrent redeemers, exactly one receives the value and
//! everyone else gets nil, then reads the tombstone for the precise
//! failure reason. Session dual-key writes go through `MULTI`/`EXEC`.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::domain::{HandshakeCode, SessionRecord};

use super::{RedeemError, SharedStore, StoreError};

const USED: &str = "used";
const EXPIRED: &str = "expired";

/// Redis-backed [`SharedStore`] for production deployments.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to Redis and verifies the connection with a `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the URL is invalid or the
    /// server is unreachable — callers treat this as fatal at startup.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(to_store_err)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(to_store_err)?;
        let store = Self { conn };
        store.ping().await?;
        Ok(store)
    }

    fn session_key(user_id: &str) -> String {
        format!("session:user:{user_id}")
    }

    fn platform_key(chat_platform_id: &str) -> String {
        format!("session:chat:{chat_platform_id}")
    }

    fn code_key(code: &str) -> String {
        format!("hs:code:{code}")
    }

    fn tombstone_key(code: &str) -> String {
        format!("hs:gone:{code}")
    }

    fn cursor_key(contract: &str) -> String {
        format!("watch:cursor:{contract}")
    }
}

fn to_store_err(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Seconds until `deadline`, floored at 1 so a just-written key is
/// always observable.
fn ttl_secs(deadline: chrono::DateTime<Utc>) -> u64 {
    (deadline - Utc::now()).num_seconds().max(1) as u64
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(to_store_err)
    }

    async fn put_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| StoreError::Corrupt(format!("session encode: {e}")))?;
        let ttl = ttl_secs(record.expires_at);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(Self::session_key(&record.user_id))
            .arg(payload)
            .arg("EX")
            .arg(ttl)
            .ignore()
            .cmd("SET")
            .arg(Self::platform_key(&record.chat_platform_id))
            .arg(&record.user_id)
            .arg("EX")
            .arg(ttl)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(to_store_err)
    }

    async fn session_by_user(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::session_key(user_id))
            .await
            .map_err(to_store_err)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let record: SessionRecord = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corrupt(format!("session decode: {e}")))?;
        // The key TTL tracks expires_at, but clamp anyway so a record
        // whose TTL outlives its deadline can never authenticate.
        Ok(Some(record).filter(|r| !r.is_expired(Utc::now())))
    }

    async fn session_by_platform(
        &self,
        chat_platform_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let user_id: Option<String> = conn
            .get(Self::platform_key(chat_platform_id))
            .await
            .map_err(to_store_err)?;
        match user_id {
            Some(user_id) => self.session_by_user(&user_id).await,
            None => Ok(None),
        }
    }

    async fn delete_session(&self, user_id: &str) -> Result<bool, StoreError> {
        // The canonical key delete is the linearization point for
        // revocation; the index entry rides in the same transaction.
        let record = self.session_by_user(user_id).await?;
        let mut conn = self.conn.clone();
        let Some(record) = record else {
            let removed: u64 = conn
                .del(Self::session_key(user_id))
                .await
                .map_err(to_store_err)?;
            return Ok(removed > 0);
        };
        let (removed,): (u64,) = redis::pipe()
            .atomic()
            .del(Self::session_key(user_id))
            .del(Self::platform_key(&record.chat_platform_id))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(to_store_err)?;
        Ok(removed > 0)
    }

    async fn put_code(&self, code: &HandshakeCode, retain: Duration) -> Result<(), StoreError> {
        let payload = serde_json::to_string(code)
            .map_err(|e| StoreError::Corrupt(format!("code encode: {e}")))?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(Self::code_key(&code.code))
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs(code.created_at + retain))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(to_store_err)
    }

    async fn redeem_code(&self, code: &str, grace: Duration) -> Result<HandshakeCode, RedeemError> {
        let mut conn = self.conn.clone();
        let grace_secs = grace.num_seconds().max(1) as u64;

        let raw: Option<String> = redis::cmd("GETDEL")
            .arg(Self::code_key(code))
            .query_async(&mut conn)
            .await
            .map_err(to_store_err)?;

        let Some(raw) = raw else {
            let reason: Option<String> = conn
                .get(Self::tombstone_key(code))
                .await
                .map_err(to_store_err)?;
            return Err(match reason.as_deref() {
                Some(USED) => RedeemError::AlreadyUsed,
                Some(EXPIRED) => RedeemError::Expired,
                _ => RedeemError::NotFound,
            });
        };

        let mut record: HandshakeCode = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corrupt(format!("code decode: {e}")))?;

        let reason = if record.is_expired(Utc::now()) {
            EXPIRED
        } else {
            USED
        };
        redis::cmd("SET")
            .arg(Self::tombstone_key(code))
            .arg(reason)
            .arg("EX")
            .arg(grace_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(to_store_err)?;

        if reason == EXPIRED {
            return Err(RedeemError::Expired);
        }
        record.used = true;
        Ok(record)
    }

    async fn cursor(&self, contract: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(Self::cursor_key(contract))
            .await
            .map_err(to_store_err)
    }

    async fn set_cursor(&self, contract: &str, block: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set(Self::cursor_key(contract), block)
            .await
            .map_err(to_store_err)
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        // Redis reaps expired keys natively; the sweep task exists for
        // backends without TTL support.
        Ok(0)
    }
}

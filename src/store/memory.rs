//! In-memory store for tests and single-process development.
//!
//! A mutex-guarded map with the same check-and-set semantics as the
//! Redis backend. Not suitable for multi-process deployments: nothing
//! here survives a restart.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::{HandshakeCode, SessionRecord};

use super::{RedeemError, SharedStore, StoreError};

/// Why a redeemed or lapsed code is still remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TombstoneReason {
    Used,
    Expired,
}

#[derive(Debug, Clone)]
enum CodeEntry {
    /// A live, unredeemed code, retained until the given instant.
    Live(HandshakeCode, DateTime<Utc>),
    /// A consumed or lapsed code kept for precise error reporting.
    Tombstone {
        reason: TombstoneReason,
        until: DateTime<Utc>,
    },
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    by_platform: HashMap<String, String>,
    codes: HashMap<String, CodeEntry>,
    cursors: HashMap<String, u64>,
}

/// In-memory [`SharedStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn put_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner
            .by_platform
            .insert(record.chat_platform_id.clone(), record.user_id.clone());
        inner
            .sessions
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn session_by_user(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .sessions
            .get(user_id)
            .filter(|r| !r.is_expired(Utc::now()))
            .cloned())
    }

    async fn session_by_platform(
        &self,
        chat_platform_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let inner = self.lock();
        let Some(user_id) = inner.by_platform.get(chat_platform_id) else {
            return Ok(None);
        };
        Ok(inner
            .sessions
            .get(user_id)
            .filter(|r| !r.is_expired(Utc::now()))
            .cloned())
    }

    async fn delete_session(&self, user_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(record) = inner.sessions.remove(user_id) else {
            return Ok(false);
        };
        inner.by_platform.remove(&record.chat_platform_id);
        Ok(true)
    }

    async fn put_code(&self, code: &HandshakeCode, retain: Duration) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.codes.insert(
            code.code.clone(),
            CodeEntry::Live(code.clone(), Utc::now() + retain),
        );
        Ok(())
    }

    async fn redeem_code(&self, code: &str, grace: Duration) -> Result<HandshakeCode, RedeemError> {
        let now = Utc::now();
        let mut inner = self.lock();

        match inner.codes.get(code).cloned() {
            None => Err(RedeemError::NotFound),
            Some(CodeEntry::Tombstone { until, .. }) if until <= now => {
                inner.codes.remove(code);
                Err(RedeemError::NotFound)
            }
            Some(CodeEntry::Tombstone { reason, .. }) => Err(match reason {
                TombstoneReason::Used => RedeemError::AlreadyUsed,
                TombstoneReason::Expired => RedeemError::Expired,
            }),
            Some(CodeEntry::Live(record, _)) if record.is_expired(now) => {
                inner.codes.insert(
                    code.to_string(),
                    CodeEntry::Tombstone {
                        reason: TombstoneReason::Expired,
                        until: now + grace,
                    },
                );
                Err(RedeemError::Expired)
            }
            Some(CodeEntry::Live(mut record, _)) => {
                // The whole check-and-set happens under one lock hold:
                // a concurrent caller sees the tombstone, never the live
                // entry.
                inner.codes.insert(
                    code.to_string(),
                    CodeEntry::Tombstone {
                        reason: TombstoneReason::Used,
                        until: now + grace,
                    },
                );
                record.used = true;
                Ok(record)
            }
        }
    }

    async fn cursor(&self, contract: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.lock().cursors.get(contract).copied())
    }

    async fn set_cursor(&self, contract: &str, block: u64) -> Result<(), StoreError> {
        self.lock().cursors.insert(contract.to_string(), block);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        let mut removed = 0u64;

        inner.codes.retain(|_, entry| {
            let keep = match entry {
                CodeEntry::Live(_, retain_until) => *retain_until > now,
                CodeEntry::Tombstone { until, .. } => *until > now,
            };
            if !keep {
                removed += 1;
            }
            keep
        });

        let expired_users: Vec<String> = inner
            .sessions
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.user_id.clone())
            .collect();
        for user_id in expired_users {
            if let Some(record) = inner.sessions.remove(&user_id) {
                inner.by_platform.remove(&record.chat_platform_id);
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(user_id: &str, platform_id: &str) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            user_id: user_id.to_string(),
            chat_platform_id: platform_id.to_string(),
            display_name: "ember".to_string(),
            wallet_address: "0xabc0000000000000000000000000000000000abc".to_string(),
            issued_at: now,
            expires_at: now + Duration::days(30),
        }
    }

    fn live_code(value: &str, ttl_secs: i64) -> HandshakeCode {
        HandshakeCode::issue(value.to_string(), Utc::now(), Duration::seconds(ttl_secs))
    }

    #[tokio::test]
    async fn session_readable_by_both_keys() {
        let store = MemoryStore::new();
        store.put_session(&record("u-1", "42")).await.ok();

        let by_user = store.session_by_user("u-1").await.ok().flatten();
        let by_platform = store.session_by_platform("42").await.ok().flatten();
        assert_eq!(by_user, by_platform);
        assert!(by_user.is_some());
    }

    #[tokio::test]
    async fn delete_removes_both_keys() {
        let store = MemoryStore::new();
        store.put_session(&record("u-1", "42")).await.ok();

        assert_eq!(store.delete_session("u-1").await.ok(), Some(true));
        assert!(store.session_by_user("u-1").await.ok().flatten().is_none());
        assert!(
            store
                .session_by_platform("42")
                .await
                .ok()
                .flatten()
                .is_none()
        );
        assert_eq!(store.delete_session("u-1").await.ok(), Some(false));
    }

    #[tokio::test]
    async fn expired_session_reads_as_absent() {
        let store = MemoryStore::new();
        let mut rec = record("u-1", "42");
        rec.expires_at = Utc::now() - Duration::seconds(1);
        store.put_session(&rec).await.ok();

        assert!(store.session_by_user("u-1").await.ok().flatten().is_none());
        assert!(
            store
                .session_by_platform("42")
                .await
                .ok()
                .flatten()
                .is_none()
        );
    }

    #[tokio::test]
    async fn redeem_succeeds_once_then_reports_already_used() {
        let store = MemoryStore::new();
        let code = live_code("CODE1", 300);
        store.put_code(&code, Duration::seconds(360)).await.ok();

        let first = store.redeem_code("CODE1", Duration::seconds(60)).await;
        let Ok(redeemed) = first else {
            panic!("first redemption should succeed");
        };
        assert!(redeemed.used);

        let second = store.redeem_code("CODE1", Duration::seconds(60)).await;
        assert!(matches!(second, Err(RedeemError::AlreadyUsed)));
    }

    #[tokio::test]
    async fn concurrent_redeem_has_exactly_one_winner() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_code(&live_code("RACE1", 300), Duration::seconds(360))
            .await
            .ok();

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.redeem_code("RACE1", Duration::seconds(60)).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.redeem_code("RACE1", Duration::seconds(60)).await })
        };

        let (ra, rb) = tokio::join!(a, b);
        let outcomes = [ra, rb].map(|joined| match joined {
            Ok(result) => result.is_ok(),
            Err(_) => false,
        });
        let winners = outcomes.iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1, "exactly one concurrent redemption must win");
    }

    #[tokio::test]
    async fn expired_code_reports_expired_not_success() {
        let store = MemoryStore::new();
        let code = live_code("OLD42", -1);
        store.put_code(&code, Duration::seconds(60)).await.ok();

        let result = store.redeem_code("OLD42", Duration::seconds(60)).await;
        assert!(matches!(result, Err(RedeemError::Expired)));

        // The reason is stable on retry within the grace window.
        let again = store.redeem_code("OLD42", Duration::seconds(60)).await;
        assert!(matches!(again, Err(RedeemError::Expired)));
    }

    #[tokio::test]
    async fn unknown_code_reports_not_found() {
        let store = MemoryStore::new();
        let result = store.redeem_code("NOPE", Duration::seconds(60)).await;
        assert!(matches!(result, Err(RedeemError::NotFound)));
    }

    #[tokio::test]
    async fn cursor_round_trips_and_overwrites() {
        let store = MemoryStore::new();
        let contract = "0xc0ffee0000000000000000000000000000000001";

        assert_eq!(store.cursor(contract).await.ok().flatten(), None);
        store.set_cursor(contract, 100).await.ok();
        assert_eq!(store.cursor(contract).await.ok().flatten(), Some(100));
        store.set_cursor(contract, 250).await.ok();
        assert_eq!(store.cursor(contract).await.ok().flatten(), Some(250));
    }

    #[tokio::test]
    async fn sweep_removes_lapsed_codes_and_sessions() {
        let store = MemoryStore::new();

        // Retention already lapsed for this code.
        store
            .put_code(&live_code("GONE1", -120), Duration::seconds(-60))
            .await
            .ok();
        let mut rec = record("u-dead", "77");
        rec.expires_at = Utc::now() - Duration::seconds(1);
        store.put_session(&rec).await.ok();
        store.put_session(&record("u-live", "88")).await.ok();

        let removed = store.sweep_expired().await.ok();
        assert_eq!(removed, Some(2));
        assert!(
            store
                .session_by_user("u-live")
                .await
                .ok()
                .flatten()
                .is_some()
        );
    }
}

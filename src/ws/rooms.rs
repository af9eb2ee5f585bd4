//! Per-connection room membership and delivery targeting.
//!
//! Membership is owned exclusively by the connection task: when the
//! task ends, the membership dies with it, which is how disconnection
//! "removes the connection from all rooms immediately" without any
//! global registry to clean up.

use std::collections::HashSet;

use crate::domain::{DomainEvent, RoomKey, SessionUser, target_rooms};
use crate::error::GatewayError;

/// The set of rooms a single connection has joined.
#[derive(Debug, Default)]
pub struct RoomSet {
    rooms: HashSet<RoomKey>,
}

impl RoomSet {
    /// Creates an empty membership set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins a room, enforcing the identity policy:
    ///
    /// - anonymous connections are restricted to `public`/`topic:` rooms;
    /// - `user:` rooms only admit the identity whose wallet they name.
    ///
    /// Returns `false` on a duplicate join (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] when the policy denies the
    /// join. Elevated rooms are never granted silently.
    pub fn join(
        &mut self,
        key: RoomKey,
        identity: Option<&SessionUser>,
    ) -> Result<bool, GatewayError> {
        if key.requires_identity() {
            let Some(user) = identity else {
                return Err(GatewayError::Unauthorized(format!(
                    "room {key} requires authentication"
                )));
            };
            if let RoomKey::User(wallet) = &key {
                if *wallet != user.wallet_address {
                    return Err(GatewayError::Unauthorized(
                        "cannot join another user's room".to_string(),
                    ));
                }
            }
        }
        Ok(self.rooms.insert(key))
    }

    /// Leaves a room. Returns `false` when the room was not joined.
    pub fn leave(&mut self, key: &RoomKey) -> bool {
        self.rooms.remove(key)
    }

    /// Returns `true` if the event targets at least one joined room.
    ///
    /// A connection in several target rooms still gets the event once:
    /// the check is membership intersection, not per-room delivery.
    #[must_use]
    pub fn wants(&self, event: &DomainEvent) -> bool {
        target_rooms(event).iter().any(|room| self.rooms.contains(room))
    }

    /// Number of joined rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns `true` when no rooms are joined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, TradeSide};

    const TOKEN_A: &str = "0xabc0000000000000000000000000000000000abc";
    const TOKEN_B: &str = "0xdef0000000000000000000000000000000000def";
    const WALLET: &str = "0xdead000000000000000000000000000000000001";

    fn user() -> SessionUser {
        SessionUser {
            user_id: "u-1".to_string(),
            chat_platform_id: "42".to_string(),
            display_name: "ember".to_string(),
            wallet_address: WALLET.to_string(),
        }
    }

    fn trade_on(token: &str) -> DomainEvent {
        DomainEvent {
            kind: EventKind::TokenTraded {
                token: token.to_string(),
                trader: WALLET.to_string(),
                side: TradeSide::Buy,
                base_amount: "1".to_string(),
                token_amount: "2".to_string(),
                price: None,
            },
            block_number: 1,
            block_timestamp: 0,
            tx_hash: "0x1".to_string(),
            log_index: 0,
        }
    }

    #[test]
    fn anonymous_restricted_to_public_and_topics() {
        let mut rooms = RoomSet::new();
        assert!(rooms.join(RoomKey::Public, None).is_ok());
        assert!(
            rooms
                .join(RoomKey::Topic("trades".to_string()), None)
                .is_ok()
        );
        assert!(
            rooms
                .join(RoomKey::Token(TOKEN_A.to_string()), None)
                .is_err()
        );
        assert!(
            rooms
                .join(RoomKey::User(WALLET.to_string()), None)
                .is_err()
        );
    }

    #[test]
    fn identified_connection_joins_token_and_own_user_room() {
        let mut rooms = RoomSet::new();
        let user = user();
        assert!(
            rooms
                .join(RoomKey::Token(TOKEN_A.to_string()), Some(&user))
                .is_ok()
        );
        assert!(
            rooms
                .join(RoomKey::User(WALLET.to_string()), Some(&user))
                .is_ok()
        );
    }

    #[test]
    fn other_users_room_denied() {
        let mut rooms = RoomSet::new();
        let user = user();
        let result = rooms.join(
            RoomKey::User("0x00b0000000000000000000000000000000000002".to_string()),
            Some(&user),
        );
        assert!(matches!(result, Err(GatewayError::Unauthorized(_))));
    }

    #[test]
    fn duplicate_join_is_idempotent() {
        let mut rooms = RoomSet::new();
        assert_eq!(rooms.join(RoomKey::Public, None).ok(), Some(true));
        assert_eq!(rooms.join(RoomKey::Public, None).ok(), Some(false));
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn leave_then_stops_wanting() {
        let mut rooms = RoomSet::new();
        rooms.join(RoomKey::Public, None).ok();
        assert!(rooms.wants(&trade_on(TOKEN_A)));
        assert!(rooms.leave(&RoomKey::Public));
        assert!(!rooms.wants(&trade_on(TOKEN_A)));
        assert!(!rooms.leave(&RoomKey::Public));
    }

    #[test]
    fn token_room_filters_by_token_subject() {
        let user = user();
        let mut a = RoomSet::new();
        a.join(RoomKey::Token(TOKEN_A.to_string()), Some(&user)).ok();
        let mut b = RoomSet::new();
        b.join(RoomKey::Token(TOKEN_B.to_string()), Some(&user)).ok();

        let event = trade_on(TOKEN_A);
        assert!(a.wants(&event));
        assert!(!b.wants(&event));
    }

    #[test]
    fn user_room_receives_own_trades_on_any_token() {
        let user = user();
        let mut rooms = RoomSet::new();
        rooms
            .join(RoomKey::User(WALLET.to_string()), Some(&user))
            .ok();
        assert!(rooms.wants(&trade_on(TOKEN_A)));
        assert!(rooms.wants(&trade_on(TOKEN_B)));
    }

    #[test]
    fn membership_in_multiple_target_rooms_still_matches_once() {
        let user = user();
        let mut rooms = RoomSet::new();
        rooms.join(RoomKey::Public, None).ok();
        rooms
            .join(RoomKey::Token(TOKEN_A.to_string()), Some(&user))
            .ok();
        // `wants` is a single membership test, so the connection loop
        // sends exactly one frame no matter how many rooms matched.
        assert!(rooms.wants(&trade_on(TOKEN_A)));
    }
}

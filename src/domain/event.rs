//! Domain events normalized from on-chain activity.
//!
//! The [`crate::watcher`] decodes raw contract logs into [`DomainEvent`]s
//! and publishes them through the [`super::EventRelay`]. Events are
//! broadcast to WebSocket subscribers grouped by room.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identity of an event instance.
///
/// `(tx_hash, log_index)` uniquely identifies an on-chain occurrence;
/// consumers must be idempotent on this pair because the watcher
/// guarantees at-least-once delivery, not exactly-once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    /// Source transaction hash (`0x…`).
    pub tx_hash: String,
    /// Position of the log within the transaction receipt.
    pub log_index: u32,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.log_index)
    }
}

/// Direction of a bonding-curve trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    /// Base currency in, tokens out.
    Buy,
    /// Tokens in, base currency out.
    Sell,
}

/// The normalized payload of an on-chain occurrence.
///
/// All amounts are fixed-point integers carried as decimal strings to
/// preserve precision when serialized to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A new token was created on the launchpad.
    TokenCreated {
        /// Token contract address.
        token: String,
        /// Address that created the token.
        creator: String,
        /// Token name.
        name: String,
        /// Token ticker symbol.
        symbol: String,
    },

    /// A bonding-curve trade was executed.
    TokenTraded {
        /// Token contract address.
        token: String,
        /// Address of the trader.
        trader: String,
        /// Buy or sell.
        side: TradeSide,
        /// Base currency amount (string-encoded fixed-point integer).
        base_amount: String,
        /// Token amount (string-encoded fixed-point integer).
        token_amount: String,
        /// Spot price after the trade, if enrichment succeeded.
        #[serde(skip_serializing_if = "Option::is_none")]
        price: Option<String>,
    },

    /// A token completed its curve and launched to the open market.
    TokenLaunched {
        /// Token contract address.
        token: String,
        /// Address of the liquidity pool the token graduated into.
        pool: String,
    },

    /// Platform tokens were staked.
    Staked {
        /// Address of the staker.
        staker: String,
        /// Staked amount (string-encoded fixed-point integer).
        amount: String,
    },

    /// Platform tokens were unstaked.
    Unstaked {
        /// Address of the staker.
        staker: String,
        /// Unstaked amount (string-encoded fixed-point integer).
        amount: String,
    },

    /// Staking rewards were claimed.
    RewardsClaimed {
        /// Address of the claimer.
        staker: String,
        /// Claimed amount (string-encoded fixed-point integer).
        amount: String,
    },

    /// Platform revenue was distributed to stakers.
    RevenueDistributed {
        /// Total distributed amount (string-encoded fixed-point integer).
        amount: String,
    },

    /// An account moved to a different fee tier.
    TierChanged {
        /// Address whose tier changed.
        account: String,
        /// Previous tier index.
        old_tier: u8,
        /// New tier index.
        new_tier: u8,
    },
}

/// An on-chain occurrence of interest, normalized for relay delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Kind-specific payload.
    #[serde(flatten)]
    pub kind: EventKind,
    /// Block the source log appeared in.
    pub block_number: u64,
    /// Unix timestamp of that block (seconds since epoch).
    pub block_timestamp: i64,
    /// Source transaction hash (`0x…`).
    pub tx_hash: String,
    /// Position of the source log within the transaction receipt.
    pub log_index: u32,
}

impl DomainEvent {
    /// Returns the `(tx_hash, log_index)` identity of this event.
    #[must_use]
    pub fn id(&self) -> EventId {
        EventId {
            tx_hash: self.tx_hash.clone(),
            log_index: self.log_index,
        }
    }

    /// Returns the relay channel this event belongs to.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self.kind {
            EventKind::TokenCreated { .. } => Channel::TokenCreated,
            EventKind::TokenTraded { .. } => Channel::TokenTraded,
            EventKind::TokenLaunched { .. } => Channel::TokenLaunched,
            EventKind::Staked { .. } => Channel::Staked,
            EventKind::Unstaked { .. } => Channel::Unstaked,
            EventKind::RewardsClaimed { .. } => Channel::RewardsClaimed,
            EventKind::RevenueDistributed { .. } => Channel::RevenueDistributed,
            EventKind::TierChanged { .. } => Channel::TierChanged,
        }
    }

    /// Returns the token address this event is about, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match &self.kind {
            EventKind::TokenCreated { token, .. }
            | EventKind::TokenTraded { token, .. }
            | EventKind::TokenLaunched { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Returns the addresses of identified counterparts (creator, trader,
    /// staker). Used to compute `user:` room targets.
    #[must_use]
    pub fn counterparties(&self) -> Vec<&str> {
        match &self.kind {
            EventKind::TokenCreated { creator, .. } => vec![creator],
            EventKind::TokenTraded { trader, .. } => vec![trader],
            EventKind::Staked { staker, .. }
            | EventKind::Unstaked { staker, .. }
            | EventKind::RewardsClaimed { staker, .. } => vec![staker],
            EventKind::TierChanged { account, .. } => vec![account],
            EventKind::TokenLaunched { .. } | EventKind::RevenueDistributed { .. } => vec![],
        }
    }

    /// Returns the event kind as a static string slice.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self.kind {
            EventKind::TokenCreated { .. } => "token_created",
            EventKind::TokenTraded { .. } => "token_traded",
            EventKind::TokenLaunched { .. } => "token_launched",
            EventKind::Staked { .. } => "staked",
            EventKind::Unstaked { .. } => "unstaked",
            EventKind::RewardsClaimed { .. } => "rewards_claimed",
            EventKind::RevenueDistributed { .. } => "revenue_distributed",
            EventKind::TierChanged { .. } => "tier_changed",
        }
    }
}

/// Relay channel taxonomy: one channel per event kind plus a catch-all
/// alert channel that observes every published event.
///
/// Ordering is guaranteed per channel, never globally across channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// `TokenCreated` events.
    TokenCreated,
    /// `TokenTraded` events.
    TokenTraded,
    /// `TokenLaunched` events.
    TokenLaunched,
    /// `Staked` events.
    Staked,
    /// `Unstaked` events.
    Unstaked,
    /// `RewardsClaimed` events.
    RewardsClaimed,
    /// `RevenueDistributed` events.
    RevenueDistributed,
    /// `TierChanged` events.
    TierChanged,
    /// Catch-all channel receiving every event.
    Alerts,
}

impl Channel {
    /// Returns the channel name as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TokenCreated => "token_created",
            Self::TokenTraded => "token_traded",
            Self::TokenLaunched => "token_launched",
            Self::Staked => "staked",
            Self::Unstaked => "unstaked",
            Self::RewardsClaimed => "rewards_claimed",
            Self::RevenueDistributed => "revenue_distributed",
            Self::TierChanged => "tier_changed",
            Self::Alerts => "alerts",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

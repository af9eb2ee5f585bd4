//! Raw log → [`DomainEvent`] decoding.
//!
//! Each watched event signature maps to one decoder. Decode failures
//! are per-log: the watcher logs and skips the bad log, never aborting
//! the batch it arrived in.

use crate::domain::{DomainEvent, EventKind, TradeSide};

use super::rpc::RawLog;

/// `TokenCreated(address indexed token, address indexed creator, bytes32 name, bytes32 symbol)`
pub const TOPIC_TOKEN_CREATED: &str =
    "0x8be0078c56c8b4f1b4c98ffedbdbbb9d7d9baf3bb7e31ad7f01efe2c3a0f4f21";
/// `TokenBought(address indexed token, address indexed trader, uint256 baseIn, uint256 tokensOut)`
pub const TOPIC_TOKEN_BOUGHT: &str =
    "0x4c209b5fc8ad50758f13e2e1088ba56a560dff690a1c6fef26394f4c03821c4f";
/// `TokenSold(address indexed token, address indexed trader, uint256 tokensIn, uint256 baseOut)`
pub const TOPIC_TOKEN_SOLD: &str =
    "0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822";
/// `TokenLaunched(address indexed token, address indexed pool)`
pub const TOPIC_TOKEN_LAUNCHED: &str =
    "0x1d2c23a8e0f5f9db22d1c11e6ad4a7bf0bd0c0a38e9ba3bcf9d78e2be080bd6a";
/// `Staked(address indexed staker, uint256 amount)`
pub const TOPIC_STAKED: &str =
    "0x9e71bc8eea02a63969f509818f2dafb9254532904319f9dbda79b67bd34a5f3d";
/// `Unstaked(address indexed staker, uint256 amount)`
pub const TOPIC_UNSTAKED: &str =
    "0x0f5bb82176feb1b5e747e28471aa92156a04d9f3ab9f45f28e2d704232b93f75";
/// `RewardsClaimed(address indexed staker, uint256 amount)`
pub const TOPIC_REWARDS_CLAIMED: &str =
    "0x106f923f993c2149d49b4255ff723acafa1f2d94393f561d3eda32ae348f7241";
/// `RevenueDistributed(uint256 amount)`
pub const TOPIC_REVENUE_DISTRIBUTED: &str =
    "0x2ff2e9d6e03e4b4b4e18e7ce88b4f287adfb0f487c6f0b2f6b9f69f9bd62a3c8";
/// `TierChanged(address indexed account, uint8 oldTier, uint8 newTier)`
pub const TOPIC_TIER_CHANGED: &str =
    "0x7a9a0a6f1c2f6f8cb5a3f3b8f5b6d5be01e20ac93c9db82bd2c41e4a9fd1a2ee";

/// Why a log could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// `topics[0]` is not one of the watched signatures.
    #[error("unknown event signature: {0}")]
    UnknownTopic(String),
    /// A required topic or data word is missing or malformed.
    #[error("malformed log: {0}")]
    Malformed(String),
}

/// Decodes a raw log into a [`DomainEvent`], stamping the given block
/// timestamp.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the signature is unknown or the log
/// payload does not match it. Callers skip the log and continue.
pub fn decode_log(log: &RawLog, block_timestamp: i64) -> Result<DomainEvent, DecodeError> {
    let topic0 = log
        .topics
        .first()
        .ok_or_else(|| DecodeError::Malformed("log without topics".to_string()))?;

    let kind = match topic0.as_str() {
        TOPIC_TOKEN_CREATED => EventKind::TokenCreated {
            token: address_topic(log, 1)?,
            creator: address_topic(log, 2)?,
            name: text_word(log, 0)?,
            symbol: text_word(log, 1)?,
        },
        TOPIC_TOKEN_BOUGHT => EventKind::TokenTraded {
            token: address_topic(log, 1)?,
            trader: address_topic(log, 2)?,
            side: TradeSide::Buy,
            base_amount: amount_word(log, 0)?,
            token_amount: amount_word(log, 1)?,
            price: None,
        },
        TOPIC_TOKEN_SOLD => EventKind::TokenTraded {
            token: address_topic(log, 1)?,
            trader: address_topic(log, 2)?,
            side: TradeSide::Sell,
            token_amount: amount_word(log, 0)?,
            base_amount: amount_word(log, 1)?,
            price: None,
        },
        TOPIC_TOKEN_LAUNCHED => EventKind::TokenLaunched {
            token: address_topic(log, 1)?,
            pool: address_topic(log, 2)?,
        },
        TOPIC_STAKED => EventKind::Staked {
            staker: address_topic(log, 1)?,
            amount: amount_word(log, 0)?,
        },
        TOPIC_UNSTAKED => EventKind::Unstaked {
            staker: address_topic(log, 1)?,
            amount: amount_word(log, 0)?,
        },
        TOPIC_REWARDS_CLAIMED => EventKind::RewardsClaimed {
            staker: address_topic(log, 1)?,
            amount: amount_word(log, 0)?,
        },
        TOPIC_REVENUE_DISTRIBUTED => EventKind::RevenueDistributed {
            amount: amount_word(log, 0)?,
        },
        TOPIC_TIER_CHANGED => EventKind::TierChanged {
            account: address_topic(log, 1)?,
            old_tier: small_word(log, 0)?,
            new_tier: small_word(log, 1)?,
        },
        other => return Err(DecodeError::UnknownTopic(other.to_string())),
    };

    Ok(DomainEvent {
        kind,
        block_number: log.block_number,
        block_timestamp,
        tx_hash: log.tx_hash.clone(),
        log_index: log.log_index,
    })
}

/// Extracts an address from an indexed topic (last 20 bytes of the
/// 32-byte topic), lowercased.
fn address_topic(log: &RawLog, index: usize) -> Result<String, DecodeError> {
    let topic = log
        .topics
        .get(index)
        .ok_or_else(|| DecodeError::Malformed(format!("missing topic {index}")))?;
    let stripped = topic.strip_prefix("0x").unwrap_or(topic);
    if stripped.len() != 64 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DecodeError::Malformed(format!("bad topic word: {topic}")));
    }
    let tail = stripped
        .get(24..)
        .ok_or_else(|| DecodeError::Malformed(format!("bad topic word: {topic}")))?;
    Ok(format!("0x{}", tail.to_ascii_lowercase()))
}

/// Extracts a data word as a decimal amount string.
fn amount_word(log: &RawLog, index: usize) -> Result<String, DecodeError> {
    super::rpc::word_to_decimal(&log.data, index)
        .ok_or_else(|| DecodeError::Malformed(format!("missing data word {index}")))
}

/// Extracts a data word as a small integer (tier indices).
fn small_word(log: &RawLog, index: usize) -> Result<u8, DecodeError> {
    let decimal = amount_word(log, index)?;
    decimal
        .parse::<u8>()
        .map_err(|_| DecodeError::Malformed(format!("data word {index} out of u8 range")))
}

/// Extracts a data word as a null-trimmed UTF-8 string (bytes32 names
/// and symbols).
fn text_word(log: &RawLog, index: usize) -> Result<String, DecodeError> {
    let stripped = log.data.strip_prefix("0x").unwrap_or(&log.data);
    let word = stripped
        .get(index * 64..(index + 1) * 64)
        .ok_or_else(|| DecodeError::Malformed(format!("missing data word {index}")))?;
    let bytes =
        hex::decode(word).map_err(|_| DecodeError::Malformed(format!("bad data word {index}")))?;
    let trimmed: Vec<u8> = bytes.into_iter().take_while(|b| *b != 0).collect();
    String::from_utf8(trimmed)
        .map_err(|_| DecodeError::Malformed(format!("data word {index} is not utf-8")))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const TOKEN: &str = "0xabc0000000000000000000000000000000000abc";
    const TRADER: &str = "0xdead000000000000000000000000000000000001";

    fn topic_for_address(address: &str) -> String {
        let stripped = address.strip_prefix("0x").unwrap_or(address);
        format!("0x{stripped:0>64}")
    }

    fn log(topics: Vec<String>, data: String) -> RawLog {
        RawLog {
            address: "0x00c0000000000000000000000000000000000c00".to_string(),
            topics,
            data,
            block_number: 1042,
            tx_hash: "0x11aa".to_string(),
            log_index: 3,
            removed: false,
        }
    }

    fn words(values: &[u128]) -> String {
        let mut data = String::from("0x");
        for v in values {
            data.push_str(&format!("{v:0>64x}"));
        }
        data
    }

    #[test]
    fn decodes_buy_as_token_traded() {
        let raw = log(
            vec![
                TOPIC_TOKEN_BOUGHT.to_string(),
                topic_for_address(TOKEN),
                topic_for_address(TRADER),
            ],
            words(&[1_000_000_000_000_000_000, 420_000_000]),
        );
        let event = decode_log(&raw, 1_700_000_000);
        let Ok(event) = event else {
            panic!("decode failed");
        };
        assert_eq!(event.block_timestamp, 1_700_000_000);
        match event.kind {
            EventKind::TokenTraded {
                token,
                trader,
                side,
                base_amount,
                token_amount,
                price,
            } => {
                assert_eq!(token, TOKEN);
                assert_eq!(trader, TRADER);
                assert_eq!(side, TradeSide::Buy);
                assert_eq!(base_amount, "1000000000000000000");
                assert_eq!(token_amount, "420000000");
                assert!(price.is_none());
            }
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn decodes_sell_with_swapped_amount_order() {
        let raw = log(
            vec![
                TOPIC_TOKEN_SOLD.to_string(),
                topic_for_address(TOKEN),
                topic_for_address(TRADER),
            ],
            words(&[420_000_000, 900_000_000_000_000_000]),
        );
        let event = decode_log(&raw, 0);
        let Ok(event) = event else {
            panic!("decode failed");
        };
        match event.kind {
            EventKind::TokenTraded {
                side,
                base_amount,
                token_amount,
                ..
            } => {
                assert_eq!(side, TradeSide::Sell);
                assert_eq!(token_amount, "420000000");
                assert_eq!(base_amount, "900000000000000000");
            }
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn decodes_token_created_with_name_and_symbol() {
        let mut name = hex::encode("Ember Token");
        name.push_str(&"0".repeat(64 - name.len()));
        let mut symbol = hex::encode("EMBR");
        symbol.push_str(&"0".repeat(64 - symbol.len()));
        let raw = log(
            vec![
                TOPIC_TOKEN_CREATED.to_string(),
                topic_for_address(TOKEN),
                topic_for_address(TRADER),
            ],
            format!("0x{name}{symbol}"),
        );
        let event = decode_log(&raw, 0);
        let Ok(event) = event else {
            panic!("decode failed");
        };
        match event.kind {
            EventKind::TokenCreated { name, symbol, .. } => {
                assert_eq!(name, "Ember Token");
                assert_eq!(symbol, "EMBR");
            }
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn decodes_staking_family() {
        for (topic, expect_staked) in [(TOPIC_STAKED, true), (TOPIC_UNSTAKED, false)] {
            let raw = log(
                vec![topic.to_string(), topic_for_address(TRADER)],
                words(&[5_000]),
            );
            let event = decode_log(&raw, 0);
            let Ok(event) = event else {
                panic!("decode failed");
            };
            match (&event.kind, expect_staked) {
                (EventKind::Staked { amount, .. }, true)
                | (EventKind::Unstaked { amount, .. }, false) => {
                    assert_eq!(amount, "5000");
                }
                other => panic!("wrong kind: {other:?}"),
            }
        }
    }

    #[test]
    fn decodes_tier_change() {
        let raw = log(
            vec![TOPIC_TIER_CHANGED.to_string(), topic_for_address(TRADER)],
            words(&[1, 3]),
        );
        let event = decode_log(&raw, 0);
        let Ok(event) = event else {
            panic!("decode failed");
        };
        match event.kind {
            EventKind::TierChanged {
                old_tier, new_tier, ..
            } => {
                assert_eq!(old_tier, 1);
                assert_eq!(new_tier, 3);
            }
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn unknown_signature_is_an_unknown_topic_error() {
        let raw = log(vec![format!("0x{}", "ee".repeat(32))], "0x".to_string());
        assert!(matches!(
            decode_log(&raw, 0),
            Err(DecodeError::UnknownTopic(_))
        ));
    }

    #[test]
    fn missing_topics_are_malformed_not_fatal() {
        let raw = log(vec![TOPIC_TOKEN_BOUGHT.to_string()], "0x".to_string());
        assert!(matches!(
            decode_log(&raw, 0),
            Err(DecodeError::Malformed(_))
        ));

        let empty = log(vec![], "0x".to_string());
        assert!(matches!(
            decode_log(&empty, 0),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn truncated_data_is_malformed() {
        let raw = log(
            vec![
                TOPIC_TOKEN_BOUGHT.to_string(),
                topic_for_address(TOKEN),
                topic_for_address(TRADER),
            ],
            words(&[1]), // needs two words
        );
        assert!(matches!(
            decode_log(&raw, 0),
            Err(DecodeError::Malformed(_))
        ));
    }
}

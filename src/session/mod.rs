//! Session bridge: handshake codes, session records, and signed tokens.

pub mod bridge;
pub mod proof;
pub mod token;

pub use bridge::{BridgeConfig, BridgeTokens, IssuedCode, SessionBridge, run_sweeper};
pub use token::{Claims, TokenSigner, TokenType};

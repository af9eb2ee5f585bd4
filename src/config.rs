//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment
//! variables (or a `.env` file via `dotenvy`). The two shared secrets
//! have no defaults — startup fails fast without them.

use std::net::SocketAddr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::session::BridgeConfig;
use crate::watcher::WatcherConfig;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Redis connection string for the shared store.
    pub redis_url: String,

    /// HTTP JSON-RPC endpoint for the chain.
    pub rpc_http_url: String,

    /// WebSocket JSON-RPC endpoint; absence means poll mode only.
    pub rpc_ws_url: Option<String>,

    /// The launchpad contract the watcher observes.
    pub launchpad_contract: String,

    /// Poll-mode tick interval in seconds.
    pub poll_interval_secs: u64,

    /// Poll-mode window cap: never look further back than `head - N`.
    pub max_block_window: u64,

    /// Budget in seconds for enrichment and block-metadata reads.
    pub enrich_timeout_secs: u64,

    /// Capacity of the watcher's duplicate-suppression window.
    pub dedup_capacity: usize,

    /// Capacity of the relay broadcast channel (doubles as each
    /// connection's bounded outbound queue).
    pub relay_capacity: usize,

    /// HMAC secret for session/refresh tokens. Required.
    pub jwt_secret: String,

    /// Secret shared with the chat bot for handshake proofs. Required.
    pub proof_secret: String,

    /// Handshake code lifetime in seconds.
    pub code_ttl_secs: i64,

    /// Tombstone grace window in seconds after a code is consumed or
    /// lapses.
    pub code_grace_secs: i64,

    /// Session record lifetime in days.
    pub session_ttl_days: i64,

    /// Access token lifetime in days.
    pub access_ttl_days: i64,

    /// Refresh token lifetime in days.
    pub refresh_ttl_days: i64,

    /// Base URL handshake deep links point at.
    pub deep_link_base: String,

    /// Interval in seconds between expiry sweeps.
    pub sweep_interval_secs: u64,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults for everything except the two
    /// shared secrets. Calls `dotenvy::dotenv().ok()` to optionally
    /// load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` cannot be parsed or if
    /// `JWT_SECRET` / `CHAT_PROOF_SECRET` are unset.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let rpc_http_url = std::env::var("RPC_HTTP_URL")
            .unwrap_or_else(|_| "http://localhost:8545".to_string());
        let rpc_ws_url = std::env::var("RPC_WS_URL").ok().filter(|v| !v.is_empty());

        let launchpad_contract = std::env::var("LAUNCHPAD_CONTRACT")
            .unwrap_or_else(|_| "0x0000000000000000000000000000000000000000".to_string())
            .to_ascii_lowercase();

        let jwt_secret =
            std::env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set")?;
        let proof_secret =
            std::env::var("CHAT_PROOF_SECRET").map_err(|_| "CHAT_PROOF_SECRET must be set")?;

        let deep_link_base = std::env::var("DEEP_LINK_BASE")
            .unwrap_or_else(|_| "https://app.ember.fi/login".to_string());

        Ok(Self {
            listen_addr,
            redis_url,
            rpc_http_url,
            rpc_ws_url,
            launchpad_contract,
            poll_interval_secs: parse_env("WATCHER_POLL_INTERVAL_SECS", 15),
            max_block_window: parse_env("WATCHER_MAX_BLOCK_WINDOW", 1_000),
            enrich_timeout_secs: parse_env("WATCHER_ENRICH_TIMEOUT_SECS", 5),
            dedup_capacity: parse_env("WATCHER_DEDUP_CAPACITY", 4_096),
            relay_capacity: parse_env("RELAY_CAPACITY", 10_000),
            jwt_secret,
            proof_secret,
            code_ttl_secs: parse_env("HANDSHAKE_CODE_TTL_SECS", 300),
            code_grace_secs: parse_env("HANDSHAKE_CODE_GRACE_SECS", 60),
            session_ttl_days: parse_env("SESSION_TTL_DAYS", 30),
            access_ttl_days: parse_env("ACCESS_TOKEN_TTL_DAYS", 7),
            refresh_ttl_days: parse_env("REFRESH_TOKEN_TTL_DAYS", 30),
            deep_link_base,
            sweep_interval_secs: parse_env("SWEEP_INTERVAL_SECS", 60),
        })
    }

    /// Derives the session-bridge tunables.
    #[must_use]
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            code_ttl: Duration::seconds(self.code_ttl_secs),
            code_grace: Duration::seconds(self.code_grace_secs),
            session_ttl: Duration::days(self.session_ttl_days),
            access_ttl: Duration::days(self.access_ttl_days),
            refresh_ttl: Duration::days(self.refresh_ttl_days),
            deep_link_base: self.deep_link_base.clone(),
            proof_secret: self.proof_secret.clone(),
        }
    }

    /// Derives the watcher tunables.
    #[must_use]
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            contract: self.launchpad_contract.clone(),
            poll_interval: StdDuration::from_secs(self.poll_interval_secs),
            max_block_window: self.max_block_window,
            enrich_timeout: StdDuration::from_secs(self.enrich_timeout_secs),
            dedup_capacity: self.dedup_capacity,
        }
    }

    /// Budget for snapshot reads served to WebSocket clients.
    #[must_use]
    pub fn snapshot_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.enrich_timeout_secs)
    }
}

/// Parses an environment variable as `T`, returning `default` on
/// missing or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

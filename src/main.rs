//! ember-gateway server entry point.
//!
//! Starts the chain watcher, the expiry sweeper, and the Axum HTTP
//! server with REST and WebSocket endpoints.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ember_gateway::api;
use ember_gateway::app_state::AppState;
use ember_gateway::config::GatewayConfig;
use ember_gateway::domain::EventRelay;
use ember_gateway::session::{SessionBridge, TokenSigner, run_sweeper};
use ember_gateway::store::{RedisStore, SharedStore};
use ember_gateway::watcher::ChainWatcher;
use ember_gateway::watcher::push::{LogSubscriber, WsSubscriber};
use ember_gateway::watcher::rpc::{ChainRpc, HttpRpc};
use ember_gateway::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting ember-gateway");

    // Connect the shared store — the only startup failure that is fatal
    let store: Arc<dyn SharedStore> = Arc::new(RedisStore::connect(&config.redis_url).await?);

    // Build domain layer
    let relay = EventRelay::new(config.relay_capacity);
    let chain: Arc<dyn ChainRpc> = Arc::new(HttpRpc::new(
        config.rpc_http_url.clone(),
        config.launchpad_contract.clone(),
    ));

    // Session bridge + expiry sweeper
    let bridge = Arc::new(SessionBridge::new(
        Arc::clone(&store),
        TokenSigner::new(&config.jwt_secret),
        config.bridge_config(),
    ));
    tokio::spawn(run_sweeper(
        Arc::clone(&store),
        std::time::Duration::from_secs(config.sweep_interval_secs),
    ));

    // Chain watcher: push mode when a WS endpoint is configured,
    // poll mode otherwise
    let subscriber: Option<Arc<dyn LogSubscriber>> = config
        .rpc_ws_url
        .clone()
        .map(|url| Arc::new(WsSubscriber::new(url)) as Arc<dyn LogSubscriber>);
    let (watcher, _watcher_handle) = ChainWatcher::new(
        config.watcher_config(),
        Arc::clone(&store),
        relay.clone(),
        Arc::clone(&chain),
        subscriber,
    );
    tokio::spawn(watcher.run());

    // Build application state
    let app_state = AppState {
        bridge,
        relay,
        chain,
        snapshot_timeout: config.snapshot_timeout(),
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

//! Main entry point for the directory-sync relay server.
//!
//! This binary hosts the authorization gate and the channel service over
//! HTTP and WebSocket using the Axum web framework.

use std::sync::Arc;

use directory_sync::RelayConfig;
use directory_sync::auth::{AuthorizationGate, StaticWorkspaceAccess, TokenStore};
use directory_sync::server::{RelayState, create_router};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = RelayConfig::from_env()?;
    info!("Starting directory-sync relay...");

    let access = match &config.access_file {
        Some(path) => StaticWorkspaceAccess::from_json_file(path)?,
        None => {
            warn!("No access file configured; every token request will be forbidden");
            StaticWorkspaceAccess::new()
        }
    };

    let gate = AuthorizationGate::new(
        Arc::new(access),
        Arc::new(TokenStore::new()),
        config.namespace.clone(),
        config.token_ttl,
    );
    let state = RelayState::new(gate);

    // Expired grants are dropped periodically.
    let tokens = Arc::clone(state.gate.tokens());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = tokens.purge_expired(chrono::Utc::now());
            if purged > 0 {
                info!("Purged {} expired tokens", purged);
            }
        }
    });

    let app = create_router(state);

    info!("Relay listening on http://{}", config.bind_addr);
    info!("Available endpoints:");
    info!("  GET  /health      - Health check");
    info!("  POST /auth/token  - Issue a workspace capability token");
    info!("  GET  /ws?token=   - Channel service WebSocket");

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

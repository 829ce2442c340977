//! Route handlers for the relay server.
//!
//! This module contains the HTTP routes: health check, token issuance and the
//! WebSocket upgrade into the channel service.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State, ws::WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{AuthorizationGate, CALLER_HEADER, CapabilityToken, ErrorBody, TokenRequest};
use crate::channel::LocalHub;
use crate::error::AuthError;
use crate::server::websocket::handle_relay_connection;

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub active_connections: usize,
    pub active_channels: usize,
}

/// Shared application state
#[derive(Clone)]
pub struct RelayState {
    pub gate: Arc<AuthorizationGate>,
    pub hub: LocalHub,
}

impl RelayState {
    /// Builds the state around a gate, sharing its token store with a new hub.
    pub fn new(gate: AuthorizationGate) -> Self {
        let hub = LocalHub::new(Arc::clone(gate.tokens()));
        Self {
            gate: Arc::new(gate),
            hub,
        }
    }
}

/// Basic health check endpoint
pub async fn health(State(state): State<RelayState>) -> Json<HealthResponse> {
    let stats = state.hub.stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Relay is running!".to_string(),
        active_connections: stats.active_connections,
        active_channels: stats.active_channels,
    })
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::MissingWorkspace => StatusCode::BAD_REQUEST,
        AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::UNAUTHORIZED,
    }
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: error.into() })).into_response()
}

/// Issues a capability token for the workspace named in the body.
///
/// The caller identity comes from the `x-caller-id` header set by the
/// fronting identity layer.
pub async fn issue_token(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller = headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok());

    // An unreadable body is treated like one without a workspace id.
    let workspace_id = serde_json::from_slice::<TokenRequest>(&body)
        .ok()
        .and_then(|request| request.workspace_id)
        .unwrap_or_default();

    match state.gate.authorize(&workspace_id, caller) {
        Ok(issued) => (StatusCode::OK, Json(issued)).into_response(),
        Err(err) => {
            let status = auth_status(&err);
            let message = match status {
                StatusCode::BAD_REQUEST => "Workspace ID is required.",
                StatusCode::FORBIDDEN => "Forbidden",
                _ => "Unauthorized",
            };
            error_response(status, message)
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// WebSocket connection handler for the channel service
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
    Query(params): Query<ConnectParams>,
) -> Response {
    let Some(token) = params.token.map(CapabilityToken::from) else {
        warn!("WebSocket upgrade without token");
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    };

    match state.hub.connect_local(&token) {
        Ok(connection) => {
            info!("Upgrading connection {}", connection.id());
            ws.on_upgrade(move |socket| handle_relay_connection(socket, connection))
        }
        Err(err) => {
            warn!("Rejected WebSocket upgrade: {}", err);
            error_response(StatusCode::UNAUTHORIZED, err.to_string())
        }
    }
}

/// Creates and configures the main application router
pub fn create_router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/token", post(issue_token))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

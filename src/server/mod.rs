//! Relay server: hosts the authorization gate and an in-process channel
//! service, exposed over HTTP and WebSocket with Axum.

pub mod routes;
pub mod websocket;

// Re-export main server functionality
pub use routes::*;
pub use websocket::{RelaySession, handle_relay_connection};

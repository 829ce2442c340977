//! Error types for the synchronization core.
//!
//! Authorization failures and transport failures are kept as separate enums so
//! callers can route the former to a re-authentication flow and the latter to
//! a retry flow. [`SyncError`] wraps both for operations that can hit either.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::auth::Capability;
use crate::session::SessionState;

/// Failures raised while obtaining or checking a capability grant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No caller identity accompanied the request
    #[error("caller is not authenticated")]
    Unauthenticated,

    /// The request did not name a workspace
    #[error("workspace id is required")]
    MissingWorkspace,

    /// The caller has no permission on the workspace
    #[error("caller '{caller}' may not access workspace '{workspace_id}'")]
    Forbidden {
        workspace_id: String,
        caller: String,
    },

    /// The token was never issued or has been revoked
    #[error("capability token is not recognised")]
    InvalidToken,

    #[error("capability token expired at {0}")]
    Expired(DateTime<Utc>),

    /// The token is valid but does not cover the requested operation
    #[error("token does not grant {capability} on channel '{channel}'")]
    NotPermitted {
        channel: String,
        capability: Capability,
    },

    /// A remote authority refused the request with the given reason
    #[error("authorization rejected: {0}")]
    Rejected(String),
}

/// Failures of the underlying channel transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("publish failed: {0}")]
    Publish(String),

    /// The peer sent something that does not follow the wire protocol
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Top-level error for session and relay operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("authorization failed: {0}")]
    Authorization(#[from] AuthError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a connect-time transport error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Transport(TransportError::Connect(message.into()))
    }

    /// True when the caller should re-authenticate rather than retry.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }

    /// True for connection drops and publish failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

//! Token acquisition as seen from a session.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::gate::{AuthorizationGate, IssuedToken};
use crate::auth::token::CapabilityToken;
use crate::error::{AuthError, SyncError, TransportError};

/// Header carrying the caller identity on token requests.
pub const CALLER_HEADER: &str = "x-caller-id";

/// Obtains a capability token for a (workspace, caller) pair.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn request_token(
        &self,
        workspace_id: &str,
        caller: &str,
    ) -> Result<CapabilityToken, SyncError>;
}

#[async_trait]
impl TokenProvider for AuthorizationGate {
    async fn request_token(
        &self,
        workspace_id: &str,
        caller: &str,
    ) -> Result<CapabilityToken, SyncError> {
        Ok(self.authorize(workspace_id, Some(caller))?.token)
    }
}

/// Body of a token request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub workspace_id: Option<String>,
}

/// Error body returned by the token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Requests tokens from a relay's `/auth/token` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTokenProvider {
    /// `endpoint` is the full URL of the token route.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn request_token(
        &self,
        workspace_id: &str,
        caller: &str,
    ) -> Result<CapabilityToken, SyncError> {
        debug!("Requesting token for workspace {} from {}", workspace_id, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(CALLER_HEADER, caller)
            .json(&TokenRequest {
                workspace_id: Some(workspace_id.to_string()),
            })
            .send()
            .await
            .map_err(|e| SyncError::connect(format!("token request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let issued: IssuedToken = response.json().await.map_err(|e| {
                TransportError::Protocol(format!("invalid token response: {e}"))
            })?;
            return Ok(issued.token);
        }

        let reason = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        warn!("Token request for workspace {} rejected: {} {}", workspace_id, status, reason);

        Err(match status {
            StatusCode::UNAUTHORIZED => AuthError::Unauthenticated.into(),
            StatusCode::BAD_REQUEST => AuthError::MissingWorkspace.into(),
            StatusCode::FORBIDDEN => AuthError::Forbidden {
                workspace_id: workspace_id.to_string(),
                caller: caller.to_string(),
            }
            .into(),
            _ => TransportError::Connect(format!("token endpoint returned {status}: {reason}"))
                .into(),
        })
    }
}

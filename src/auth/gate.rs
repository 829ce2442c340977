//! Authorization gate: turns a (workspace, caller) pair into a capability token.
//!
//! Workspace permissions come from an external store, consumed here only as a
//! yes/no answer through [`WorkspaceAccess`].

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::token::{Capability, CapabilityGrant, CapabilityToken, TokenStore};
use crate::channel::ChannelName;
use crate::error::{AuthError, SyncError};

/// Answers whether a caller may work on a workspace.
pub trait WorkspaceAccess: Send + Sync {
    fn can_access(&self, workspace_id: &str, caller: &str) -> bool;
}

/// Fixed workspace → permitted callers table.
///
/// The JSON form is an object mapping workspace ids to arrays of caller ids.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct StaticWorkspaceAccess {
    workspaces: HashMap<String, HashSet<String>>,
}

impl StaticWorkspaceAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, workspace_id: &str, caller: &str) -> Self {
        self.allow(workspace_id, caller);
        self
    }

    pub fn allow(&mut self, workspace_id: &str, caller: &str) {
        self.workspaces
            .entry(workspace_id.to_string())
            .or_default()
            .insert(caller.to_string());
    }

    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json)
            .map_err(|e| SyncError::config(format!("invalid workspace access list: {e}")))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, SyncError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!("cannot read access file {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }
}

impl WorkspaceAccess for StaticWorkspaceAccess {
    fn can_access(&self, workspace_id: &str, caller: &str) -> bool {
        self.workspaces
            .get(workspace_id)
            .is_some_and(|callers| callers.contains(caller))
    }
}

/// A freshly minted token together with its grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: CapabilityToken,
    #[serde(flatten)]
    pub grant: CapabilityGrant,
}

/// Mints single-channel capability tokens for permitted callers.
pub struct AuthorizationGate {
    access: Arc<dyn WorkspaceAccess>,
    tokens: Arc<TokenStore>,
    namespace: String,
    ttl: Duration,
}

impl AuthorizationGate {
    pub fn new(
        access: Arc<dyn WorkspaceAccess>,
        tokens: Arc<TokenStore>,
        namespace: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            access,
            tokens,
            namespace: namespace.into(),
            ttl,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Issues a token for `caller` on the channel of `workspace_id`.
    ///
    /// Identity is checked before the workspace id, and the workspace id
    /// before permission.
    pub fn authorize(
        &self,
        workspace_id: &str,
        caller: Option<&str>,
    ) -> Result<IssuedToken, AuthError> {
        let caller = match caller.map(str::trim) {
            Some(caller) if !caller.is_empty() => caller,
            _ => {
                warn!("Token request without caller identity");
                return Err(AuthError::Unauthenticated);
            }
        };

        let workspace_id = workspace_id.trim();
        if workspace_id.is_empty() {
            warn!("Token request from {} without workspace id", caller);
            return Err(AuthError::MissingWorkspace);
        }

        if !self.access.can_access(workspace_id, caller) {
            warn!("Caller {} denied access to workspace {}", caller, workspace_id);
            return Err(AuthError::Forbidden {
                workspace_id: workspace_id.to_string(),
                caller: caller.to_string(),
            });
        }

        let issued_at = Utc::now();
        let grant = CapabilityGrant {
            client_id: caller.to_string(),
            channel: ChannelName::for_workspace(&self.namespace, workspace_id),
            capabilities: Capability::ALL.to_vec(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };
        let token = self.tokens.insert(grant.clone());

        info!(
            "Issued token for {} on channel {} (expires {})",
            caller, grant.channel, grant.expires_at
        );
        Ok(IssuedToken { token, grant })
    }
}

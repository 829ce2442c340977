//! Channel and connection identifiers.
//!
//! Channel names are derived deterministically from a fixed namespace and the
//! workspace id, so two workspaces never share a channel.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace prefix shared by every workspace channel.
pub const DEFAULT_NAMESPACE: &str = "directory-planner";

/// Name of a publish/subscribe channel scoped to one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Builds the channel name for `workspace_id` under `namespace`.
    ///
    /// Surrounding whitespace in the workspace id is ignored, matching how the
    /// authorization gate reads it.
    pub fn for_workspace(namespace: &str, workspace_id: &str) -> Self {
        ChannelName(format!("{namespace}:{}", workspace_id.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the channel service assigns to a single connection.
///
/// Presence and echo suppression key on this id, not on the user: a user who
/// reconnects gets a new connection id and is a new participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generates a fresh random connection id
    pub fn generate() -> Self {
        ConnectionId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        ConnectionId(value.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        ConnectionId(value)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

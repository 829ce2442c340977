//! Capability tokens and the grants they stand for.
//!
//! A token is an opaque bearer string. The grant behind it is kept in a
//! [`TokenStore`] shared by the authorization gate (which issues) and the
//! channel service (which checks on every operation).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelName;
use crate::error::AuthError;

/// An operation a grant may allow on its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Subscribe,
    Publish,
    Presence,
}

impl Capability {
    /// Everything a workspace collaborator needs.
    pub const ALL: [Capability; 3] = [
        Capability::Subscribe,
        Capability::Publish,
        Capability::Presence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Subscribe => "subscribe",
            Capability::Publish => "publish",
            Capability::Presence => "presence",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque bearer credential.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityToken(String);

impl CapabilityToken {
    pub fn generate() -> Self {
        CapabilityToken(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CapabilityToken {
    fn from(value: String) -> Self {
        CapabilityToken(value)
    }
}

impl From<&str> for CapabilityToken {
    fn from(value: &str) -> Self {
        CapabilityToken(value.to_string())
    }
}

// Tokens end up in logs via Debug on containing structs.
impl fmt::Debug for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "CapabilityToken({prefix}…)")
    }
}

/// What a token authorizes, for whom, and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityGrant {
    /// Caller identity the grant was minted for
    pub client_id: String,
    /// The single channel the grant covers
    pub channel: ChannelName,
    pub capabilities: Vec<Capability>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CapabilityGrant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the grant covers `capability` on `channel`, ignoring expiry.
    pub fn permits(&self, channel: &ChannelName, capability: Capability) -> bool {
        &self.channel == channel && self.capabilities.contains(&capability)
    }

    /// Full check, including expiry.
    pub fn check(
        &self,
        channel: &ChannelName,
        capability: Capability,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if self.is_expired_at(now) {
            return Err(AuthError::Expired(self.expires_at));
        }
        if !self.permits(channel, capability) {
            return Err(AuthError::NotPermitted {
                channel: channel.to_string(),
                capability,
            });
        }
        Ok(())
    }
}

/// Issued tokens and their grants.
#[derive(Debug, Default)]
pub struct TokenStore {
    grants: RwLock<HashMap<CapabilityToken, CapabilityGrant>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `grant` under a freshly generated token.
    pub fn insert(&self, grant: CapabilityGrant) -> CapabilityToken {
        let token = CapabilityToken::generate();
        self.grants.write().insert(token.clone(), grant);
        token
    }

    /// Looks up a live grant.
    pub fn resolve(
        &self,
        token: &CapabilityToken,
        now: DateTime<Utc>,
    ) -> Result<CapabilityGrant, AuthError> {
        let grants = self.grants.read();
        let grant = grants.get(token).ok_or(AuthError::InvalidToken)?;
        if grant.is_expired_at(now) {
            return Err(AuthError::Expired(grant.expires_at));
        }
        Ok(grant.clone())
    }

    /// Resolves `token` and checks it covers `capability` on `channel`.
    pub fn authorize(
        &self,
        token: &CapabilityToken,
        channel: &ChannelName,
        capability: Capability,
        now: DateTime<Utc>,
    ) -> Result<CapabilityGrant, AuthError> {
        let grant = self.resolve(token, now)?;
        grant.check(channel, capability, now)?;
        Ok(grant)
    }

    pub fn revoke(&self, token: &CapabilityToken) -> bool {
        self.grants.write().remove(token).is_some()
    }

    /// Drops every expired grant, returning how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut grants = self.grants.write();
        let before = grants.len();
        grants.retain(|_, grant| !grant.is_expired_at(now));
        before - grants.len()
    }

    pub fn len(&self) -> usize {
        self.grants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.read().is_empty()
    }
}

//! Configuration for sessions and for the relay server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::channel::DEFAULT_NAMESPACE;
use crate::error::SyncError;
use crate::session::ReconnectPolicy;
use crate::sync::{DEFAULT_DEBOUNCE_WINDOW, DEFAULT_INITIAL_TEXT, SyncBuffer};

/// Client-side session settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period before a burst of edits is published
    pub debounce_window: Duration,
    /// Channel namespace; must match the one the token was issued for
    pub namespace: String,
    /// Buffer text before the first remote state arrives
    pub initial_text: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            namespace: DEFAULT_NAMESPACE.to_string(),
            initial_text: DEFAULT_INITIAL_TEXT.to_string(),
            reconnect: ReconnectPolicy::Never,
        }
    }
}

impl SyncConfig {
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// A fresh buffer holding the configured placeholder text.
    pub fn initial_buffer(&self) -> SyncBuffer {
        SyncBuffer::new(self.initial_text.clone())
    }
}

pub const ENV_BIND_ADDR: &str = "DIRSYNC_BIND_ADDR";
pub const ENV_NAMESPACE: &str = "DIRSYNC_NAMESPACE";
pub const ENV_TOKEN_TTL_SECS: &str = "DIRSYNC_TOKEN_TTL_SECS";
pub const ENV_ACCESS_FILE: &str = "DIRSYNC_ACCESS_FILE";

/// Relay server settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub namespace: String,
    /// Lifetime of issued capability tokens
    pub token_ttl: chrono::Duration,
    /// JSON workspace access list; when absent nobody is authorized
    pub access_file: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            namespace: DEFAULT_NAMESPACE.to_string(),
            token_ttl: chrono::Duration::minutes(60),
            access_file: None,
        }
    }
}

impl RelayConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            config.bind_addr = addr
                .parse()
                .map_err(|e| SyncError::config(format!("{ENV_BIND_ADDR}='{addr}': {e}")))?;
        }
        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            if namespace.trim().is_empty() {
                return Err(SyncError::config(format!("{ENV_NAMESPACE} must not be empty")));
            }
            config.namespace = namespace;
        }
        if let Some(ttl) = lookup(ENV_TOKEN_TTL_SECS) {
            let secs: i64 = ttl
                .parse()
                .map_err(|e| SyncError::config(format!("{ENV_TOKEN_TTL_SECS}='{ttl}': {e}")))?;
            if secs <= 0 {
                return Err(SyncError::config(format!(
                    "{ENV_TOKEN_TTL_SECS} must be positive"
                )));
            }
            config.token_ttl = chrono::Duration::seconds(secs);
        }
        config.access_file = lookup(ENV_ACCESS_FILE).map(PathBuf::from);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_sync_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce_window, Duration::from_millis(500));
        assert_eq!(config.namespace, "directory-planner");
        assert_eq!(config.initial_text, "project-root/\n  - loading...");
        assert_eq!(config.reconnect, ReconnectPolicy::Never);
        assert_eq!(config.initial_buffer().text(), "project-root/\n  - loading...");
    }

    #[test]
    fn test_relay_defaults_without_overrides() {
        let config = RelayConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(config.token_ttl, chrono::Duration::minutes(60));
        assert!(config.access_file.is_none());
    }

    #[test]
    fn test_relay_overrides() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            (ENV_BIND_ADDR, "0.0.0.0:8080"),
            (ENV_NAMESPACE, "planner-staging"),
            (ENV_TOKEN_TTL_SECS, "90"),
            (ENV_ACCESS_FILE, "/etc/dirsync/access.json"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.namespace, "planner-staging");
        assert_eq!(config.token_ttl, chrono::Duration::seconds(90));
        assert_eq!(
            config.access_file,
            Some(PathBuf::from("/etc/dirsync/access.json"))
        );
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for pairs in [
            [(ENV_BIND_ADDR, "not-an-address")],
            [(ENV_TOKEN_TTL_SECS, "soon")],
            [(ENV_TOKEN_TTL_SECS, "0")],
            [(ENV_NAMESPACE, " ")],
        ] {
            let err = RelayConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
            assert!(matches!(err, SyncError::Config(_)), "{err}");
        }
    }
}

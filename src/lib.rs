//! # directory-sync - real-time sync and presence for a shared directory plan
//!
//! Lets several clients co-edit one shared text document per workspace and
//! see who else is connected, on top of a token-authenticated
//! publish/subscribe channel service.
//!
//! ## Features
//!
//! - **Optimistic local edits**: the local buffer updates at once, before any network round trip
//! - **Debounced publishing**: a burst of edits goes out as one message carrying the latest text
//! - **Echo suppression**: a session ignores its own messages coming back from the channel
//! - **Presence**: deduplicated, insertion-ordered participant list per channel
//! - **Scoped tokens**: each token covers subscribe, publish and presence on exactly one workspace channel
//!
//! The document is a single scalar value with last-writer-wins semantics;
//! there is no merge of concurrent edits.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use directory_sync::auth::{AuthorizationGate, StaticWorkspaceAccess, TokenStore};
//! use directory_sync::channel::LocalHub;
//! use directory_sync::sync::{ParticipantProfile, SyncBuffer};
//! use directory_sync::{ChannelSession, SyncConfig};
//!
//! # async fn run() -> Result<(), directory_sync::SyncError> {
//! let tokens = Arc::new(TokenStore::new());
//! let access = StaticWorkspaceAccess::new().with_member("w1", "alice");
//! let gate = AuthorizationGate::new(
//!     Arc::new(access),
//!     Arc::clone(&tokens),
//!     "directory-planner",
//!     chrono::Duration::minutes(60),
//! );
//! let hub = LocalHub::new(tokens);
//!
//! let session = ChannelSession::authorize_and_open(
//!     &gate,
//!     &hub,
//!     "w1",
//!     "alice",
//!     ParticipantProfile::for_caller("alice"),
//!     SyncBuffer::default(),
//!     &SyncConfig::default(),
//! )
//! .await?;
//! session.on_remote_edit(|text| println!("remote edit: {text}"));
//! session.publish_edit("project-root/\n  - src/\n");
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod channel;
pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod sync;

// Re-export the main public API
pub use config::{RelayConfig, SyncConfig};
pub use error::{AuthError, SyncError, TransportError};
pub use session::{ChannelSession, ReconnectPolicy, SessionState};
pub use sync::{Participant, ParticipantProfile, PresenceRegistry, SyncBuffer};

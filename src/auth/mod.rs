//! Authorization gate and capability tokens.
//!
//! The gate issues time-boxed tokens granting subscribe, publish and presence
//! on exactly one workspace channel. Sessions obtain tokens through a
//! [`TokenProvider`]; the channel service checks them through the shared
//! [`TokenStore`].

pub mod gate;
pub mod provider;
pub mod token;

pub use gate::{AuthorizationGate, IssuedToken, StaticWorkspaceAccess, WorkspaceAccess};
pub use provider::{CALLER_HEADER, ErrorBody, HttpTokenProvider, TokenProvider, TokenRequest};
pub use token::{Capability, CapabilityGrant, CapabilityToken, TokenStore};

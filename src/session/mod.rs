//! Channel sessions and their lifecycle.

pub mod channel_session;
pub mod reconnect;
pub mod state;

pub use channel_session::ChannelSession;
pub use reconnect::{ReconnectPolicy, retry_open};
pub use state::SessionState;

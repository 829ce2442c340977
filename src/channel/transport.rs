//! The channel service contract consumed by sessions.
//!
//! A service turns a capability token into a connection with its own
//! connection id. Attaching to a channel yields the ordered stream of
//! deliveries for that channel: published messages (including this
//! connection's own, tagged with its id) and presence notices.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::auth::CapabilityToken;
use crate::channel::{ChannelName, ConnectionId, Delivery};
use crate::error::SyncError;
use crate::sync::ParticipantProfile;

/// Stream of deliveries for one attached channel.
pub type Subscription = mpsc::UnboundedReceiver<Delivery>;

/// Token-authenticated publish/subscribe service.
#[async_trait]
pub trait ChannelService: Send + Sync {
    /// Opens a connection. Rejected tokens surface as authorization errors.
    async fn connect(&self, token: &CapabilityToken) -> Result<Box<dyn ChannelConnection>, SyncError>;
}

/// One live connection to a channel service.
#[async_trait]
pub trait ChannelConnection: Send + Sync {
    /// Id assigned by the service at connect time; fixed for the connection's lifetime.
    fn connection_id(&self) -> &ConnectionId;

    /// Subscribes to `channel`. The first delivery is a presence sync.
    async fn attach(&self, channel: &ChannelName) -> Result<Subscription, SyncError>;

    async fn publish(&self, channel: &ChannelName, name: &str, data: Value) -> Result<(), SyncError>;

    async fn enter_presence(
        &self,
        channel: &ChannelName,
        profile: &ParticipantProfile,
    ) -> Result<(), SyncError>;

    /// Unsubscribes from `channel` and leaves its presence set.
    async fn detach(&self, channel: &ChannelName) -> Result<(), SyncError>;

    /// Releases the connection. Safe to call more than once.
    async fn close(&self);
}

//! Channel service plumbing: naming, the message protocol, the service
//! contract, and its in-process and WebSocket implementations.

pub mod hub;
pub mod naming;
pub mod protocol;
pub mod transport;
pub mod wire;
pub mod ws;

pub use hub::{HubStats, LocalConnection, LocalHub};
pub use naming::{ChannelName, ConnectionId, DEFAULT_NAMESPACE};
pub use protocol::{
    ChannelEvent, DIRECTORY_UPDATE, DecodeError, Delivery, InboundMessage, PresenceNotice,
};
pub use transport::{ChannelConnection, ChannelService, Subscription};
pub use wire::{ClientFrame, ServerFrame};
pub use ws::{WsChannelService, WsConnection};

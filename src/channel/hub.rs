//! In-process channel service.
//!
//! `LocalHub` fans every published message out to all subscribers of the
//! channel, the sender included, tagged with the sender's connection id. It
//! keeps presence membership per channel and checks the caller's capability
//! token on every operation, so an expired token stops working mid-session.
//! The relay server exposes the same hub over WebSocket.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::auth::{Capability, CapabilityToken, TokenStore};
use crate::channel::transport::{ChannelConnection, ChannelService, Subscription};
use crate::channel::{ChannelName, ConnectionId, Delivery, InboundMessage, PresenceNotice};
use crate::error::{SyncError, TransportError};
use crate::sync::{Participant, ParticipantProfile};

/// Counters for monitoring hub activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub messages_published: u64,
    pub messages_delivered: u64,
    pub active_connections: usize,
    pub active_channels: usize,
}

struct Subscriber {
    connection_id: ConnectionId,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct ChannelRoom {
    subscribers: Vec<Subscriber>,
    members: Vec<Participant>,
}

impl ChannelRoom {
    /// Sends `delivery` to every live subscriber, pruning closed ones.
    fn broadcast(&mut self, delivery: &Delivery) -> usize {
        self.subscribers.retain(|s| !s.tx.is_closed());
        self.subscribers
            .iter()
            .filter(|s| s.tx.send(delivery.clone()).is_ok())
            .count()
    }

    fn is_idle(&self) -> bool {
        self.subscribers.is_empty() && self.members.is_empty()
    }
}

struct HubInner {
    tokens: Arc<TokenStore>,
    channels: Mutex<HashMap<ChannelName, ChannelRoom>>,
    connections: AtomicUsize,
    published: AtomicU64,
    delivered: AtomicU64,
}

impl HubInner {
    fn remove_from(&self, channel: &ChannelName, connection_id: &ConnectionId) {
        let mut channels = self.channels.lock();
        let Some(room) = channels.get_mut(channel) else {
            return;
        };

        room.subscribers.retain(|s| &s.connection_id != connection_id);
        if let Some(index) = room
            .members
            .iter()
            .position(|m| &m.connection_id == connection_id)
        {
            room.members.remove(index);
            room.broadcast(&Delivery::Presence(PresenceNotice::Leave(
                connection_id.clone(),
            )));
            debug!("Connection {} left presence on {}", connection_id, channel);
        }

        if room.is_idle() {
            channels.remove(channel);
        }
    }
}

/// Shared handle to an in-process channel service.
#[derive(Clone)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

impl LocalHub {
    pub fn new(tokens: Arc<TokenStore>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                tokens,
                channels: Mutex::new(HashMap::new()),
                connections: AtomicUsize::new(0),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
            }),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    /// Opens a connection with a freshly generated id.
    pub fn connect_local(&self, token: &CapabilityToken) -> Result<LocalConnection, SyncError> {
        self.connect_with_id(token, ConnectionId::generate())
    }

    /// Opens a connection with a caller-chosen id.
    pub fn connect_with_id(
        &self,
        token: &CapabilityToken,
        connection_id: ConnectionId,
    ) -> Result<LocalConnection, SyncError> {
        let grant = self.inner.tokens.resolve(token, Utc::now())?;
        self.inner.connections.fetch_add(1, Ordering::Relaxed);
        info!(
            "Connection {} opened for {} ({})",
            connection_id, grant.client_id, grant.channel
        );

        Ok(LocalConnection {
            id: connection_id,
            token: token.clone(),
            hub: Arc::clone(&self.inner),
            channels: Mutex::new(HashSet::new()),
            released: AtomicBool::new(false),
        })
    }

    /// Current presence members of `channel`, in entry order.
    pub fn members(&self, channel: &ChannelName) -> Vec<Participant> {
        self.inner
            .channels
            .lock()
            .get(channel)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, channel: &ChannelName) -> usize {
        self.inner
            .channels
            .lock()
            .get(channel)
            .map(|room| room.subscribers.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            messages_published: self.inner.published.load(Ordering::Relaxed),
            messages_delivered: self.inner.delivered.load(Ordering::Relaxed),
            active_connections: self.inner.connections.load(Ordering::Relaxed),
            active_channels: self.inner.channels.lock().len(),
        }
    }
}

#[async_trait]
impl ChannelService for LocalHub {
    async fn connect(&self, token: &CapabilityToken) -> Result<Box<dyn ChannelConnection>, SyncError> {
        Ok(Box::new(self.connect_local(token)?))
    }
}

/// A connection to a [`LocalHub`].
///
/// Dropping the connection releases it.
pub struct LocalConnection {
    id: ConnectionId,
    token: CapabilityToken,
    hub: Arc<HubInner>,
    /// Channels this connection subscribed to or entered presence on
    channels: Mutex<HashSet<ChannelName>>,
    released: AtomicBool,
}

impl LocalConnection {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn authorize(&self, channel: &ChannelName, capability: Capability) -> Result<(), SyncError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed.into());
        }
        self.hub
            .tokens
            .authorize(&self.token, channel, capability, Utc::now())?;
        Ok(())
    }

    /// Subscribes to `channel`, replacing any earlier subscription of this connection.
    pub fn subscribe_channel(&self, channel: &ChannelName) -> Result<Subscription, SyncError> {
        self.authorize(channel, Capability::Subscribe)?;

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut channels = self.hub.channels.lock();
            let room = channels.entry(channel.clone()).or_default();
            room.subscribers.retain(|s| s.connection_id != self.id);
            // Receiver is still held locally, so this cannot fail.
            let _ = tx.send(Delivery::Presence(PresenceNotice::Sync(room.members.clone())));
            room.subscribers.push(Subscriber {
                connection_id: self.id.clone(),
                tx,
            });
        }
        self.channels.lock().insert(channel.clone());

        debug!("Connection {} attached to {}", self.id, channel);
        Ok(rx)
    }

    /// Publishes to every subscriber of `channel`. Returns the delivery count.
    pub fn publish_message(
        &self,
        channel: &ChannelName,
        name: &str,
        data: Value,
    ) -> Result<usize, SyncError> {
        self.authorize(channel, Capability::Publish)?;

        let delivery = Delivery::Message(InboundMessage::new(self.id.clone(), name, data));
        let delivered = self
            .hub
            .channels
            .lock()
            .get_mut(channel)
            .map(|room| room.broadcast(&delivery))
            .unwrap_or(0);

        self.hub.published.fetch_add(1, Ordering::Relaxed);
        self.hub
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        debug!(
            "Connection {} published '{}' on {} to {} subscribers",
            self.id, name, channel, delivered
        );
        Ok(delivered)
    }

    /// Adds this connection to the presence set of `channel`.
    pub fn enter(&self, channel: &ChannelName, profile: &ParticipantProfile) -> Result<(), SyncError> {
        self.authorize(channel, Capability::Presence)?;

        {
            let mut channels = self.hub.channels.lock();
            let room = channels.entry(channel.clone()).or_default();
            if room.members.iter().any(|m| m.connection_id == self.id) {
                return Ok(());
            }
            let participant = Participant::new(self.id.clone(), profile.clone());
            room.members.push(participant.clone());
            room.broadcast(&Delivery::Presence(PresenceNotice::Enter(participant)));
        }
        self.channels.lock().insert(channel.clone());

        debug!("Connection {} entered presence on {}", self.id, channel);
        Ok(())
    }

    /// Unsubscribes from `channel` and leaves its presence set.
    pub fn leave(&self, channel: &ChannelName) {
        self.channels.lock().remove(channel);
        self.hub.remove_from(channel, &self.id);
    }

    /// Detaches from every channel. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let channels: Vec<ChannelName> = self.channels.lock().drain().collect();
        for channel in &channels {
            self.hub.remove_from(channel, &self.id);
        }
        self.hub.connections.fetch_sub(1, Ordering::Relaxed);
        info!("Connection {} released", self.id);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl ChannelConnection for LocalConnection {
    fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    async fn attach(&self, channel: &ChannelName) -> Result<Subscription, SyncError> {
        self.subscribe_channel(channel)
    }

    async fn publish(&self, channel: &ChannelName, name: &str, data: Value) -> Result<(), SyncError> {
        self.publish_message(channel, name, data).map(|_| ())
    }

    async fn enter_presence(
        &self,
        channel: &ChannelName,
        profile: &ParticipantProfile,
    ) -> Result<(), SyncError> {
        self.enter(channel, profile)
    }

    async fn detach(&self, channel: &ChannelName) -> Result<(), SyncError> {
        self.leave(channel);
        Ok(())
    }

    async fn close(&self) {
        self.release();
    }
}

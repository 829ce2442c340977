//! Message protocol carried over a workspace channel.
//!
//! Outbound edits are a closed set of events ([`ChannelEvent`]); each maps to
//! an event name and a JSON payload. Inbound deliveries carry the sender's
//! connection id as tagged by the channel service. Anything that does not
//! decode into a known event is dropped by the session.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::channel::ConnectionId;
use crate::error::SyncError;
use crate::sync::Participant;

/// Event name used for whole-document updates.
pub const DIRECTORY_UPDATE: &str = "directory-update";

/// Events exchanged between sessions on a workspace channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The full text of the shared directory structure
    DirectoryUpdate { text: String },
}

#[derive(Deserialize)]
struct DirectoryUpdatePayload {
    text: String,
}

/// Reasons an inbound message is not a usable [`ChannelEvent`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("malformed '{event}' payload: {reason}")]
    MalformedPayload { event: String, reason: String },
}

impl ChannelEvent {
    pub fn directory_update(text: impl Into<String>) -> Self {
        ChannelEvent::DirectoryUpdate { text: text.into() }
    }

    /// Event name to publish under
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::DirectoryUpdate { .. } => DIRECTORY_UPDATE,
        }
    }

    /// JSON payload to publish
    pub fn payload(&self) -> Value {
        match self {
            ChannelEvent::DirectoryUpdate { text } => json!({ "text": text }),
        }
    }

    /// Decodes an event from its published name and payload.
    pub fn decode(name: &str, payload: &Value) -> Result<Self, DecodeError> {
        match name {
            DIRECTORY_UPDATE => {
                let parsed = DirectoryUpdatePayload::deserialize(payload).map_err(|e| {
                    DecodeError::MalformedPayload {
                        event: name.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(ChannelEvent::DirectoryUpdate { text: parsed.text })
            }
            other => Err(DecodeError::UnknownEvent(other.to_string())),
        }
    }
}

/// A published message as delivered to a subscriber.
///
/// `connection_id` is the sender, as tagged by the channel service. It is
/// optional on the wire so that a message missing it can be recognised and
/// dropped instead of failing to parse the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default)]
    pub connection_id: Option<ConnectionId>,
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl InboundMessage {
    pub fn new(sender: ConnectionId, name: impl Into<String>, data: Value) -> Self {
        Self {
            connection_id: Some(sender),
            name: name.into(),
            data,
        }
    }
}

/// Presence changes on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceNotice {
    /// Full membership, sent once right after attach
    Sync(Vec<Participant>),
    Enter(Participant),
    Leave(ConnectionId),
}

/// Anything the channel service delivers to an attached subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Message(InboundMessage),
    Presence(PresenceNotice),
    /// The service rejected an operation this connection made on the channel
    Error(SyncError),
}

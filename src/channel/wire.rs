//! JSON frames exchanged between the relay server and WebSocket clients.
//!
//! Every frame is a JSON object tagged by an `op` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::{ChannelName, ConnectionId, Delivery, InboundMessage, PresenceNotice};
use crate::error::{AuthError, SyncError, TransportError};
use crate::sync::{Participant, ParticipantProfile};

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    Attach {
        channel: ChannelName,
    },
    Detach {
        channel: ChannelName,
    },
    Publish {
        channel: ChannelName,
        name: String,
        #[serde(default)]
        data: Value,
    },
    EnterPresence {
        channel: ChannelName,
        profile: ParticipantProfile,
    },
}

/// Frames sent by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// First frame on every connection
    Connected {
        connection_id: ConnectionId,
    },
    Attached {
        channel: ChannelName,
    },
    Message {
        channel: ChannelName,
        message: InboundMessage,
    },
    PresenceSync {
        channel: ChannelName,
        members: Vec<Participant>,
    },
    PresenceEnter {
        channel: ChannelName,
        member: Participant,
    },
    PresenceLeave {
        channel: ChannelName,
        connection_id: ConnectionId,
    },
    Error {
        /// HTTP-style status: 400 bad frame, 401 authorization, 500 other
        code: u16,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<ChannelName>,
    },
}

pub const CODE_BAD_FRAME: u16 = 400;
pub const CODE_UNAUTHORIZED: u16 = 401;
pub const CODE_INTERNAL: u16 = 500;

impl ServerFrame {
    /// Wraps a hub delivery for `channel`.
    pub fn from_delivery(channel: ChannelName, delivery: Delivery) -> Self {
        match delivery {
            Delivery::Message(message) => ServerFrame::Message { channel, message },
            Delivery::Presence(PresenceNotice::Sync(members)) => {
                ServerFrame::PresenceSync { channel, members }
            }
            Delivery::Presence(PresenceNotice::Enter(member)) => {
                ServerFrame::PresenceEnter { channel, member }
            }
            Delivery::Presence(PresenceNotice::Leave(connection_id)) => {
                ServerFrame::PresenceLeave {
                    channel,
                    connection_id,
                }
            }
            Delivery::Error(err) => ServerFrame::error(&err, Some(channel)),
        }
    }

    /// Splits a frame back into its channel and delivery, if it carries one.
    pub fn into_delivery(self) -> Option<(ChannelName, Delivery)> {
        match self {
            ServerFrame::Message { channel, message } => Some((channel, Delivery::Message(message))),
            ServerFrame::PresenceSync { channel, members } => {
                Some((channel, Delivery::Presence(PresenceNotice::Sync(members))))
            }
            ServerFrame::PresenceEnter { channel, member } => {
                Some((channel, Delivery::Presence(PresenceNotice::Enter(member))))
            }
            ServerFrame::PresenceLeave {
                channel,
                connection_id,
            } => Some((
                channel,
                Delivery::Presence(PresenceNotice::Leave(connection_id)),
            )),
            ServerFrame::Error {
                code,
                message,
                channel: Some(channel),
            } => Some((channel, Delivery::Error(error_from_frame(code, message)))),
            _ => None,
        }
    }

    /// Error frame describing `err`.
    pub fn error(err: &SyncError, channel: Option<ChannelName>) -> Self {
        let code = match err {
            SyncError::Authorization(_) => CODE_UNAUTHORIZED,
            _ => CODE_INTERNAL,
        };
        ServerFrame::Error {
            code,
            message: err.to_string(),
            channel,
        }
    }
}

/// Rebuilds a client-side error from a relay error frame.
pub fn error_from_frame(code: u16, message: String) -> SyncError {
    match code {
        CODE_UNAUTHORIZED => AuthError::Rejected(message).into(),
        _ => TransportError::Protocol(message).into(),
    }
}

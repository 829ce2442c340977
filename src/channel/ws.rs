//! WebSocket client for the relay's channel service.
//!
//! One socket carries every channel of a connection. A writer task drains an
//! outgoing frame queue; a reader task routes inbound frames to the matching
//! channel subscription and resolves pending attach acknowledgements. Errors
//! the relay reports against an attached channel arrive on that channel's
//! subscription as [`Delivery::Error`]. When the socket ends, every
//! subscription stream ends with it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::auth::CapabilityToken;
use crate::channel::transport::{ChannelConnection, ChannelService, Subscription};
use crate::channel::wire::{ClientFrame, ServerFrame, error_from_frame};
use crate::channel::{ChannelName, ConnectionId, Delivery};
use crate::error::{AuthError, SyncError, TransportError};
use crate::sync::ParticipantProfile;

/// How long to wait for the relay's `connected` and `attached` frames.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `close` waits for queued frames to reach the socket.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Channel service reached over a relay WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsChannelService {
    url: String,
}

impl WsChannelService {
    /// `url` is the relay's WebSocket route, e.g. `ws://127.0.0.1:3000/ws`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn connect_ws(&self, token: &CapabilityToken) -> Result<WsConnection, SyncError> {
        let url = format!("{}?token={}", self.url, token.as_str());
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(map_connect_error)?;
        let (mut writer, mut reader) = stream.split();

        let connection_id = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        return match serde_json::from_str::<ServerFrame>(&text) {
                            Ok(ServerFrame::Connected { connection_id }) => Ok(connection_id),
                            Ok(ServerFrame::Error { code, message, .. }) => {
                                Err(error_from_frame(code, message))
                            }
                            Ok(other) => Err(TransportError::Protocol(format!(
                                "expected connected frame, got {other:?}"
                            ))
                            .into()),
                            Err(e) => Err(TransportError::Protocol(e.to_string()).into()),
                        };
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => return Err(SyncError::connect(e.to_string())),
                }
            }
            Err(TransportError::ConnectionClosed.into())
        })
        .await
        .map_err(|_| SyncError::connect("timed out waiting for connected frame"))??;

        info!("Connected to relay {} as {}", self.url, connection_id);

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Dropping unencodable frame: {}", e);
                        continue;
                    }
                };
                if writer.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = writer.close().await;
        });

        let routes = Arc::new(Mutex::new(Routes::default()));
        let reader_routes = Arc::clone(&routes);
        let reader_id = connection_id.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => reader_routes.lock().route(frame),
                        Err(e) => warn!("Ignoring malformed relay frame: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Relay socket error on {}: {}", reader_id, e);
                        break;
                    }
                }
            }
            // Dropping the senders ends every subscription stream.
            reader_routes.lock().clear();
            info!("Relay connection {} ended", reader_id);
        });

        Ok(WsConnection {
            id: connection_id,
            outgoing: Mutex::new(Some(outgoing)),
            routes,
            reader_task,
            writer_task: Mutex::new(Some(writer_task)),
        })
    }
}

fn map_connect_error(err: tungstenite::Error) -> SyncError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status == tungstenite::http::StatusCode::UNAUTHORIZED
                || status == tungstenite::http::StatusCode::FORBIDDEN
            {
                AuthError::Rejected(format!("relay refused connection: {status}")).into()
            } else {
                SyncError::connect(format!("relay returned {status}"))
            }
        }
        other => SyncError::connect(other.to_string()),
    }
}

#[async_trait]
impl ChannelService for WsChannelService {
    async fn connect(&self, token: &CapabilityToken) -> Result<Box<dyn ChannelConnection>, SyncError> {
        Ok(Box::new(self.connect_ws(token).await?))
    }
}

type AttachAck = oneshot::Sender<Result<(), SyncError>>;

#[derive(Default)]
struct Routes {
    subscriptions: HashMap<ChannelName, mpsc::UnboundedSender<Delivery>>,
    pending: HashMap<ChannelName, AttachAck>,
}

impl Routes {
    fn route(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Attached { channel } => {
                if let Some(ack) = self.pending.remove(&channel) {
                    let _ = ack.send(Ok(()));
                }
            }
            ServerFrame::Error {
                code,
                message,
                channel,
            } => {
                let Some(channel) = channel else {
                    warn!("Relay reported error {}: {}", code, message);
                    return;
                };
                let err = error_from_frame(code, message);
                if let Some(ack) = self.pending.remove(&channel) {
                    self.subscriptions.remove(&channel);
                    let _ = ack.send(Err(err));
                } else if let Some(tx) = self.subscriptions.get(&channel) {
                    let _ = tx.send(Delivery::Error(err));
                } else {
                    warn!("Relay reported error on unattached channel {}: {}", channel, err);
                }
            }
            ServerFrame::Connected { .. } => {
                debug!("Ignoring repeated connected frame");
            }
            frame => {
                if let Some((channel, delivery)) = frame.into_delivery() {
                    match self.subscriptions.get(&channel) {
                        Some(tx) => {
                            let _ = tx.send(delivery);
                        }
                        None => debug!("Delivery for unattached channel {}", channel),
                    }
                }
            }
        }
    }

    fn clear(&mut self) {
        self.subscriptions.clear();
        self.pending.clear();
    }
}

/// A live relay connection.
pub struct WsConnection {
    id: ConnectionId,
    /// Taken on close so the writer flushes and closes the socket
    outgoing: Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>,
    routes: Arc<Mutex<Routes>>,
    reader_task: JoinHandle<()>,
    /// Awaited by `close` so queued frames are flushed
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl WsConnection {
    fn send(&self, frame: ClientFrame) -> Result<(), SyncError> {
        match self.outgoing.lock().as_ref() {
            Some(outgoing) => outgoing
                .send(frame)
                .map_err(|_| TransportError::ConnectionClosed.into()),
            None => Err(TransportError::ConnectionClosed.into()),
        }
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
        if let Some(writer) = self.writer_task.get_mut().take() {
            writer.abort();
        }
    }
}

#[async_trait]
impl ChannelConnection for WsConnection {
    fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    async fn attach(&self, channel: &ChannelName) -> Result<Subscription, SyncError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        {
            let mut routes = self.routes.lock();
            routes.subscriptions.insert(channel.clone(), tx);
            routes.pending.insert(channel.clone(), ack_tx);
        }
        self.send(ClientFrame::Attach {
            channel: channel.clone(),
        })?;

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, ack_rx).await {
            Ok(Ok(Ok(()))) => Ok(rx),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed.into()),
            Err(_) => {
                let mut routes = self.routes.lock();
                routes.pending.remove(channel);
                routes.subscriptions.remove(channel);
                Err(SyncError::connect(format!("timed out attaching to {channel}")))
            }
        }
    }

    async fn publish(&self, channel: &ChannelName, name: &str, data: Value) -> Result<(), SyncError> {
        self.send(ClientFrame::Publish {
            channel: channel.clone(),
            name: name.to_string(),
            data,
        })
        .map_err(|_| TransportError::Publish(format!("connection {} is closed", self.id)).into())
    }

    async fn enter_presence(
        &self,
        channel: &ChannelName,
        profile: &ParticipantProfile,
    ) -> Result<(), SyncError> {
        self.send(ClientFrame::EnterPresence {
            channel: channel.clone(),
            profile: profile.clone(),
        })
    }

    async fn detach(&self, channel: &ChannelName) -> Result<(), SyncError> {
        self.routes.lock().subscriptions.remove(channel);
        self.send(ClientFrame::Detach {
            channel: channel.clone(),
        })
    }

    async fn close(&self) {
        if self.outgoing.lock().take().is_none() {
            return;
        }
        self.routes.lock().clear();
        debug!("Closing relay connection {}", self.id);

        // The writer ends once the queue it drains is empty and its sender is gone.
        let writer = self.writer_task.lock().take();
        if let Some(mut writer) = writer {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer)
                .await
                .is_err()
            {
                warn!("Relay connection {} did not flush before close", self.id);
                writer.abort();
            }
        }
        self.reader_task.abort();
    }
}

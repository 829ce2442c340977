//! WebSocket session management for the relay.
//!
//! Each socket is backed by one [`LocalConnection`] on the hub. Client frames
//! are applied to the connection; deliveries from every attached channel are
//! funnelled into a single outgoing frame queue and written to the socket.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::channel::wire::{CODE_BAD_FRAME, ClientFrame, ServerFrame};
use crate::channel::{ChannelName, LocalConnection};

/// Relay-side state of one WebSocket client.
pub struct RelaySession {
    socket: WebSocket,
    connection: LocalConnection,
    frames_tx: mpsc::UnboundedSender<ServerFrame>,
    frames_rx: mpsc::UnboundedReceiver<ServerFrame>,
    /// Per-channel tasks forwarding hub deliveries into the frame queue
    forwarders: HashMap<ChannelName, JoinHandle<()>>,
}

impl RelaySession {
    pub fn new(socket: WebSocket, connection: LocalConnection) -> Self {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        Self {
            socket,
            connection,
            frames_tx,
            frames_rx,
            forwarders: HashMap::new(),
        }
    }

    /// Handle the WebSocket connection lifecycle
    pub async fn handle(mut self) {
        let connection_id = self.connection.id().clone();
        info!("Relay session {} established", connection_id);

        let hello = ServerFrame::Connected {
            connection_id: connection_id.clone(),
        };
        if let Err(e) = self.send_frame(&hello).await {
            error!("Failed to greet {}: {}", connection_id, e);
            self.shutdown();
            return;
        }

        loop {
            tokio::select! {
                msg = self.socket.recv() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text_message(&text),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = self.socket.send(Message::Pong(data)).await {
                            error!("Failed to send pong to {}: {}", connection_id, e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Relay session {} closed by client", connection_id);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and pong frames carry nothing for us
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", connection_id, e);
                        break;
                    }
                },
                Some(frame) = self.frames_rx.recv() => {
                    if let Err(e) = self.send_frame(&frame).await {
                        warn!("Failed to send frame to {}: {}", connection_id, e);
                        break;
                    }
                }
            }
        }

        self.shutdown();
        info!("Relay session {} ended", connection_id);
    }

    /// Handle incoming text messages
    fn handle_text_message(&mut self, text: &str) {
        match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => self.process_frame(frame),
            Err(e) => {
                warn!("Failed to parse frame from {}: {}", self.connection.id(), e);
                // Don't break the connection for parse errors
                self.queue(ServerFrame::Error {
                    code: CODE_BAD_FRAME,
                    message: format!("malformed frame: {e}"),
                    channel: None,
                });
            }
        }
    }

    fn process_frame(&mut self, frame: ClientFrame) {
        match frame {
            ClientFrame::Attach { channel } => self.handle_attach(channel),
            ClientFrame::Detach { channel } => {
                if let Some(forwarder) = self.forwarders.remove(&channel) {
                    forwarder.abort();
                }
                self.connection.leave(&channel);
            }
            ClientFrame::Publish {
                channel,
                name,
                data,
            } => {
                if let Err(err) = self.connection.publish_message(&channel, &name, data) {
                    warn!("Publish from {} rejected: {}", self.connection.id(), err);
                    self.queue(ServerFrame::error(&err, Some(channel)));
                }
            }
            ClientFrame::EnterPresence { channel, profile } => {
                if let Err(err) = self.connection.enter(&channel, &profile) {
                    warn!("Presence enter from {} rejected: {}", self.connection.id(), err);
                    self.queue(ServerFrame::error(&err, Some(channel)));
                }
            }
        }
    }

    fn handle_attach(&mut self, channel: ChannelName) {
        let mut deliveries = match self.connection.subscribe_channel(&channel) {
            Ok(deliveries) => deliveries,
            Err(err) => {
                warn!("Attach from {} rejected: {}", self.connection.id(), err);
                self.queue(ServerFrame::error(&err, Some(channel)));
                return;
            }
        };

        // Acknowledge before any delivery for the channel is queued.
        self.queue(ServerFrame::Attached {
            channel: channel.clone(),
        });

        let frames_tx = self.frames_tx.clone();
        let forward_channel = channel.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                let frame = ServerFrame::from_delivery(forward_channel.clone(), delivery);
                if frames_tx.send(frame).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.forwarders.insert(channel, forwarder) {
            previous.abort();
        }
    }

    fn queue(&self, frame: ServerFrame) {
        // The receiver lives in self, so this only fails during teardown.
        let _ = self.frames_tx.send(frame);
    }

    /// Send a frame to the client
    async fn send_frame(
        &mut self,
        frame: &ServerFrame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let json = serde_json::to_string(frame)?;
        self.socket.send(Message::Text(json)).await?;
        Ok(())
    }

    fn shutdown(&mut self) {
        for (_, forwarder) in self.forwarders.drain() {
            forwarder.abort();
        }
        self.connection.release();
    }
}

/// Create and handle a relay session for an upgraded socket.
pub async fn handle_relay_connection(socket: WebSocket, connection: LocalConnection) {
    RelaySession::new(socket, connection).handle().await;
}

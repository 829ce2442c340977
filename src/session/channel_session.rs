//! Channel session: one authenticated connection to one workspace channel.
//!
//! The session wires inbound deliveries into the caller's [`SyncBuffer`] and
//! its own [`PresenceRegistry`], and routes outbound edits through a
//! [`Debouncer`]. Deliveries are processed one at a time on a single task, so
//! per-sender ordering from the channel service is preserved.
//!
//! Messages whose sender connection id equals this session's own id are
//! echoes of edits already applied locally and are discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::{CapabilityToken, TokenProvider};
use crate::channel::{
    ChannelConnection, ChannelEvent, ChannelName, ChannelService, ConnectionId, Delivery,
    InboundMessage, Subscription,
};
use crate::config::SyncConfig;
use crate::error::{SyncError, TransportError};
use crate::session::{SessionState, retry_open};
use crate::sync::{Debouncer, Participant, ParticipantProfile, PresenceRegistry, SyncBuffer};

type EditHandler = Arc<dyn Fn(&str) + Send + Sync>;
type PresenceHandler = Arc<dyn Fn(&[Participant]) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&SyncError) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    edit: RwLock<Vec<EditHandler>>,
    presence: RwLock<Vec<PresenceHandler>>,
    error: RwLock<Vec<ErrorHandler>>,
}

/// State shared between the session handle, its inbound task and its debouncer.
struct SessionShared {
    workspace_id: String,
    channel: ChannelName,
    connection_id: ConnectionId,
    state: Mutex<SessionState>,
    buffer: SyncBuffer,
    presence: RwLock<PresenceRegistry>,
    handlers: Handlers,
}

impl SessionShared {
    fn new(
        workspace_id: &str,
        channel: ChannelName,
        connection_id: ConnectionId,
        buffer: SyncBuffer,
    ) -> Self {
        Self {
            workspace_id: workspace_id.trim().to_string(),
            channel,
            connection_id,
            state: Mutex::new(SessionState::Connected),
            buffer,
            presence: RwLock::new(PresenceRegistry::new()),
            handlers: Handlers::default(),
        }
    }

    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Moves to Closed. Returns false if the session was already closed.
    fn mark_closed(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_closed() {
            return false;
        }
        *state = SessionState::Closed;
        true
    }

    fn handle_delivery(&self, delivery: Delivery) {
        match delivery {
            Delivery::Message(message) => {
                if let Some(text) = self.accept_message(message) {
                    self.buffer.apply_remote(text.clone());
                    let handlers = self.handlers.edit.read().clone();
                    for handler in &handlers {
                        handler(&text);
                    }
                }
            }
            Delivery::Presence(notice) => {
                let snapshot = {
                    let mut presence = self.presence.write();
                    if !presence.apply(notice) {
                        return;
                    }
                    presence.participants().to_vec()
                };
                let handlers = self.handlers.presence.read().clone();
                for handler in &handlers {
                    handler(&snapshot);
                }
            }
            Delivery::Error(err) => {
                warn!("Channel {} rejected an operation: {}", self.channel, err);
                self.report_error(&err);
            }
        }
    }

    /// Filters an inbound message down to the edit it carries, if it should
    /// be applied: drops echoes, messages without a sender, and anything that
    /// does not decode.
    fn accept_message(&self, message: InboundMessage) -> Option<String> {
        let Some(sender) = message.connection_id else {
            debug!("Dropping '{}' message without sender on {}", message.name, self.channel);
            return None;
        };
        if sender == self.connection_id {
            debug!("Dropping echo of own '{}' message", message.name);
            return None;
        }

        match ChannelEvent::decode(&message.name, &message.data) {
            Ok(ChannelEvent::DirectoryUpdate { text }) => Some(text),
            Err(e) => {
                warn!("Dropping message from {} on {}: {}", sender, self.channel, e);
                None
            }
        }
    }

    fn report_error(&self, err: &SyncError) {
        let handlers = self.handlers.error.read().clone();
        for handler in &handlers {
            handler(err);
        }
    }
}

/// A live collaborative session on one workspace channel.
///
/// Dropping the session stops its background tasks without publishing any
/// pending edit; call [`ChannelSession::close`] to also leave the channel
/// cleanly.
pub struct ChannelSession {
    shared: Arc<SessionShared>,
    connection: Arc<dyn ChannelConnection>,
    debouncer: Debouncer<String>,
    inbound: JoinHandle<()>,
    /// Set once the connection has been released
    released: AtomicBool,
}

impl ChannelSession {
    /// Acquires a token from `provider`, then opens the session.
    pub async fn authorize_and_open<P, S>(
        provider: &P,
        service: &S,
        workspace_id: &str,
        caller: &str,
        profile: ParticipantProfile,
        buffer: SyncBuffer,
        config: &SyncConfig,
    ) -> Result<Self, SyncError>
    where
        P: TokenProvider + ?Sized,
        S: ChannelService + ?Sized,
    {
        let mut state = SessionState::Idle;
        state.transition(SessionState::Authorizing)?;
        info!("Authorizing {} for workspace {}", caller, workspace_id);

        let token = match provider.request_token(workspace_id, caller).await {
            Ok(token) => token,
            Err(err) => {
                error!("Authorization for workspace {} failed: {}", workspace_id, err);
                return Err(err);
            }
        };

        Self::establish(state, service, workspace_id, &token, profile, buffer, config).await
    }

    /// Like [`ChannelSession::authorize_and_open`], retrying transport
    /// failures according to `config.reconnect`.
    ///
    /// Every attempt requests a new token and gets a new connection id;
    /// `buffer` is shared across attempts.
    pub async fn open_with_retry<P, S>(
        provider: &P,
        service: &S,
        workspace_id: &str,
        caller: &str,
        profile: ParticipantProfile,
        buffer: SyncBuffer,
        config: &SyncConfig,
    ) -> Result<Self, SyncError>
    where
        P: TokenProvider + ?Sized,
        S: ChannelService + ?Sized,
    {
        retry_open(&config.reconnect, || {
            Self::authorize_and_open(
                provider,
                service,
                workspace_id,
                caller,
                profile.clone(),
                buffer.clone(),
                config,
            )
        })
        .await
    }

    /// Opens the session with a token the caller already holds.
    pub async fn open<S>(
        service: &S,
        workspace_id: &str,
        token: &CapabilityToken,
        profile: ParticipantProfile,
        buffer: SyncBuffer,
        config: &SyncConfig,
    ) -> Result<Self, SyncError>
    where
        S: ChannelService + ?Sized,
    {
        Self::establish(
            SessionState::Idle,
            service,
            workspace_id,
            token,
            profile,
            buffer,
            config,
        )
        .await
    }

    async fn establish<S>(
        mut state: SessionState,
        service: &S,
        workspace_id: &str,
        token: &CapabilityToken,
        profile: ParticipantProfile,
        buffer: SyncBuffer,
        config: &SyncConfig,
    ) -> Result<Self, SyncError>
    where
        S: ChannelService + ?Sized,
    {
        state.transition(SessionState::Connecting)?;
        let channel = ChannelName::for_workspace(&config.namespace, workspace_id);

        let connection: Arc<dyn ChannelConnection> = match service.connect(token).await {
            Ok(connection) => Arc::from(connection),
            Err(err) => {
                error!("Connecting to {} failed: {}", channel, err);
                return Err(err);
            }
        };

        let deliveries = match Self::attach(connection.as_ref(), &channel, &profile).await {
            Ok(deliveries) => deliveries,
            Err(err) => {
                error!("Attaching to {} failed: {}", channel, err);
                connection.close().await;
                return Err(err);
            }
        };
        state.transition(SessionState::Connected)?;

        let connection_id = connection.connection_id().clone();
        info!("Session {} connected to {}", connection_id, channel);

        let shared = Arc::new(SessionShared::new(
            workspace_id,
            channel,
            connection_id,
            buffer,
        ));
        let debouncer = Self::outbound_debouncer(config, &shared, &connection);
        let inbound = tokio::spawn(pump_deliveries(Arc::clone(&shared), deliveries));

        Ok(Self {
            shared,
            connection,
            debouncer,
            inbound,
            released: AtomicBool::new(false),
        })
    }

    async fn attach(
        connection: &dyn ChannelConnection,
        channel: &ChannelName,
        profile: &ParticipantProfile,
    ) -> Result<Subscription, SyncError> {
        let deliveries = connection.attach(channel).await?;
        connection.enter_presence(channel, profile).await?;
        Ok(deliveries)
    }

    fn outbound_debouncer(
        config: &SyncConfig,
        shared: &Arc<SessionShared>,
        connection: &Arc<dyn ChannelConnection>,
    ) -> Debouncer<String> {
        let shared = Arc::clone(shared);
        let connection = Arc::clone(connection);

        Debouncer::new(config.debounce_window, move |text: String| {
            let shared = Arc::clone(&shared);
            let connection = Arc::clone(&connection);
            async move {
                if shared.state() != SessionState::Connected {
                    return;
                }
                let event = ChannelEvent::directory_update(text);
                match connection
                    .publish(&shared.channel, event.name(), event.payload())
                    .await
                {
                    Ok(()) => debug!("Published {} on {}", event.name(), shared.channel),
                    Err(err) => {
                        error!("Publishing to {} failed: {}", shared.channel, err);
                        shared.report_error(&err);
                    }
                }
            }
        })
    }

    pub fn workspace_id(&self) -> &str {
        &self.shared.workspace_id
    }

    pub fn channel(&self) -> &ChannelName {
        &self.shared.channel
    }

    /// Id the channel service assigned to this session's connection.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.shared.connection_id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn buffer(&self) -> &SyncBuffer {
        &self.shared.buffer
    }

    pub fn text(&self) -> String {
        self.shared.buffer.text()
    }

    /// Applies `text` locally at once and schedules it for publishing.
    ///
    /// The publish happens after the debounce window; a later call within the
    /// window replaces this one. Ignored once the session is closed.
    pub fn publish_edit(&self, text: impl Into<String>) {
        if self.state().is_closed() {
            debug!("Ignoring edit on closed session {}", self.shared.connection_id);
            return;
        }
        let text = text.into();
        self.shared.buffer.apply_local(text.clone());
        self.debouncer.schedule(text);
    }

    /// Registers a callback run once per accepted remote edit.
    pub fn on_remote_edit<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.handlers.edit.write().push(Arc::new(handler));
    }

    /// Current participants in insertion order.
    pub fn presence(&self) -> Vec<Participant> {
        self.shared.presence.read().participants().to_vec()
    }

    /// Registers a callback run with the full participant list after each change.
    pub fn on_presence_change<F>(&self, handler: F)
    where
        F: Fn(&[Participant]) + Send + Sync + 'static,
    {
        self.shared.handlers.presence.write().push(Arc::new(handler));
    }

    /// Registers a callback for errors raised after open, such as publish
    /// failures or the transport dropping.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&SyncError) + Send + Sync + 'static,
    {
        self.shared.handlers.error.write().push(Arc::new(handler));
    }

    /// Cancels any pending publish, leaves the channel and releases the
    /// connection. Safe to call more than once.
    pub async fn close(&self) {
        let was_open = self.shared.mark_closed();
        self.debouncer.cancel();
        self.inbound.abort();

        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if was_open {
            if let Err(err) = self.connection.detach(&self.shared.channel).await {
                warn!("Detaching from {} failed: {}", self.shared.channel, err);
            }
        }
        self.connection.close().await;
        info!("Session {} closed", self.shared.connection_id);
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.shared.mark_closed();
        self.debouncer.cancel();
        self.inbound.abort();
    }
}

async fn pump_deliveries(shared: Arc<SessionShared>, mut deliveries: Subscription) {
    while let Some(delivery) = deliveries.recv().await {
        shared.handle_delivery(delivery);
    }

    if shared.mark_closed() {
        warn!("Channel {} stream ended; session closed", shared.channel);
        shared.report_error(&TransportError::ConnectionClosed.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{DIRECTORY_UPDATE, PresenceNotice};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn shared_for(id: &str) -> SessionShared {
        SessionShared::new(
            "w1",
            ChannelName::for_workspace("directory-planner", "w1"),
            ConnectionId::from(id),
            SyncBuffer::new(""),
        )
    }

    fn edit_from(sender: &str, text: &str) -> Delivery {
        Delivery::Message(InboundMessage::new(
            ConnectionId::from(sender),
            DIRECTORY_UPDATE,
            json!({ "text": text }),
        ))
    }

    fn participant(id: &str) -> Participant {
        Participant::new(ConnectionId::from(id), ParticipantProfile::for_caller(id))
    }

    #[test]
    fn test_own_messages_are_suppressed() {
        let shared = shared_for("A");
        let calls = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen = Arc::clone(&calls);
        shared
            .handlers
            .edit
            .write()
            .push(Arc::new(move |text: &str| seen.lock().push(text.to_string())));

        shared.handle_delivery(edit_from("A", "echo"));
        assert!(calls.lock().is_empty());
        assert_eq!(shared.buffer.text(), "");

        shared.handle_delivery(edit_from("B", "from b"));
        assert_eq!(*calls.lock(), vec!["from b".to_string()]);
        assert_eq!(shared.buffer.text(), "from b");
    }

    #[test]
    fn test_malformed_messages_are_dropped() {
        let shared = shared_for("A");
        shared.buffer.apply_local("kept");

        let without_sender = InboundMessage {
            connection_id: None,
            name: DIRECTORY_UPDATE.to_string(),
            data: json!({ "text": "orphan" }),
        };
        shared.handle_delivery(Delivery::Message(without_sender));
        shared.handle_delivery(Delivery::Message(InboundMessage::new(
            ConnectionId::from("B"),
            DIRECTORY_UPDATE,
            json!({ "content": "wrong field" }),
        )));
        shared.handle_delivery(Delivery::Message(InboundMessage::new(
            ConnectionId::from("B"),
            "cursor-move",
            json!({ "text": "unknown event" }),
        )));

        assert_eq!(shared.buffer.text(), "kept");
        assert_eq!(shared.buffer.revision(), 1);
    }

    #[test]
    fn test_presence_handlers_fire_only_on_change() {
        let shared = shared_for("A");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        shared
            .handlers
            .presence
            .write()
            .push(Arc::new(move |_: &[Participant]| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        shared.handle_delivery(Delivery::Presence(PresenceNotice::Sync(vec![participant("B")])));
        shared.handle_delivery(Delivery::Presence(PresenceNotice::Enter(participant("A"))));
        shared.handle_delivery(Delivery::Presence(PresenceNotice::Enter(participant("A"))));
        shared.handle_delivery(Delivery::Presence(PresenceNotice::Leave(ConnectionId::from("C"))));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let ids: Vec<_> = shared
            .presence
            .read()
            .participants()
            .iter()
            .map(|p| p.connection_id.to_string())
            .collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn test_rejections_reach_error_handlers() {
        let shared = shared_for("A");
        let errors = Arc::new(Mutex::new(Vec::<SyncError>::new()));
        let seen = Arc::clone(&errors);
        shared
            .handlers
            .error
            .write()
            .push(Arc::new(move |err: &SyncError| seen.lock().push(err.clone())));

        let rejection: SyncError = crate::error::AuthError::Rejected("token expired".into()).into();
        shared.handle_delivery(Delivery::Error(rejection.clone()));

        assert_eq!(*errors.lock(), vec![rejection]);
        assert_eq!(shared.state(), SessionState::Connected);
        assert_eq!(shared.buffer.text(), "");
    }

    #[test]
    fn test_mark_closed_once() {
        let shared = shared_for("A");
        assert!(shared.mark_closed());
        assert!(!shared.mark_closed());
        assert_eq!(shared.state(), SessionState::Closed);
    }
}

//! Event handling for session-core operations
//!
//! Hosts observe a session in one of two ways:
//!
//! - implement [`SessionEventHandler`] (or build a [`CallbackSet`] from
//!   closures) and pass it to [`SessionManager::initialize`]
//! - call [`SessionManager::subscribe_events`] for a broadcast stream of
//!   [`SessionEvent`]s
//!
//! Both see the same events in the same order.
//!
//! # Usage Examples
//!
//! ```rust
//! use avatar_rtc_client_core::events::{ConnectionStateInfo, RemoteStreamInfo, SessionEventHandler};
//! use async_trait::async_trait;
//!
//! struct AvatarView;
//!
//! #[async_trait]
//! impl SessionEventHandler for AvatarView {
//!     async fn on_connection_state_change(&self, info: ConnectionStateInfo) {
//!         println!("session is {} (connected: {})", info.state, info.connected);
//!     }
//!
//!     async fn on_remote_stream_update(&self, info: RemoteStreamInfo) {
//!         println!("render {} stream {}", info.kind, info.stream.id());
//!     }
//! }
//! ```
//!
//! [`SessionManager::initialize`]: crate::SessionManager::initialize
//! [`SessionManager::subscribe_events`]: crate::SessionManager::subscribe_events

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use crate::error::SessionError;
use crate::media::{AggregateStream, MediaKind};
use crate::peer::ControllerState;

/// Capacity of the broadcast channel behind [`SessionManager::subscribe_events`](crate::SessionManager::subscribe_events)
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ConnectionStateInfo {
    pub state: ControllerState,
    pub previous_state: Option<ControllerState>,
    /// True exactly when `state` is `Connected`
    pub connected: bool,
    /// Connect attempt this change belongs to
    pub epoch: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RemoteStreamInfo {
    pub kind: MediaKind,
    pub stream: AggregateStream,
    pub epoch: u64,
    pub timestamp: DateTime<Utc>,
}

/// Everything the session reports to the host
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ConnectionStateChanged { info: ConnectionStateInfo },
    RemoteStreamUpdated { info: RemoteStreamInfo },
    SessionIdReceived { session_id: String },
    Error { error: SessionError },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::ConnectionStateChanged { .. } => "connection_state_changed",
            SessionEvent::RemoteStreamUpdated { .. } => "remote_stream_updated",
            SessionEvent::SessionIdReceived { .. } => "session_id_received",
            SessionEvent::Error { .. } => "error",
        }
    }
}

/// Host-facing observer
///
/// Every method has a no-op default so a host implements only what it
/// renders. Callbacks are awaited in order; a slow callback delays the ones
/// after it, not the media engine.
#[async_trait]
pub trait SessionEventHandler: Send + Sync {
    async fn on_connection_state_change(&self, _info: ConnectionStateInfo) {}

    /// A new track joined the aggregate stream of `info.kind`
    async fn on_remote_stream_update(&self, _info: RemoteStreamInfo) {}

    /// The avatar service assigned an id to the session
    ///
    /// Fires after the service's answer has been applied, so an attempt that
    /// fails while applying it never reports an id.
    async fn on_session_id_received(&self, _session_id: String) {}

    /// Called after the session has been torn down
    async fn on_error(&self, _error: SessionError) {}

    async fn on_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::ConnectionStateChanged { info } => self.on_connection_state_change(info).await,
            SessionEvent::RemoteStreamUpdated { info } => self.on_remote_stream_update(info).await,
            SessionEvent::SessionIdReceived { session_id } => self.on_session_id_received(session_id).await,
            SessionEvent::Error { error } => self.on_error(error).await,
        }
    }
}

type StateCallback = Arc<dyn Fn(ControllerState, bool) + Send + Sync>;
type StreamCallback = Arc<dyn Fn(MediaKind, AggregateStream) + Send + Sync>;
type SessionIdCallback = Arc<dyn Fn(String) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(SessionError) + Send + Sync>;

/// Closure-based [`SessionEventHandler`]
///
/// ```rust
/// use avatar_rtc_client_core::events::CallbackSet;
///
/// let callbacks = CallbackSet::new()
///     .on_connection_state_change(|state, connected| println!("{state}: {connected}"))
///     .on_error(|e| eprintln!("session failed: {e}"));
/// ```
#[derive(Clone, Default)]
pub struct CallbackSet {
    state: Option<StateCallback>,
    stream: Option<StreamCallback>,
    session_id: Option<SessionIdCallback>,
    error: Option<ErrorCallback>,
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connection_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(ControllerState, bool) + Send + Sync + 'static,
    {
        self.state = Some(Arc::new(f));
        self
    }

    pub fn on_remote_stream_update<F>(mut self, f: F) -> Self
    where
        F: Fn(MediaKind, AggregateStream) + Send + Sync + 'static,
    {
        self.stream = Some(Arc::new(f));
        self
    }

    pub fn on_session_id_received<F>(mut self, f: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.session_id = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(SessionError) + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSet")
            .field("on_connection_state_change", &self.state.is_some())
            .field("on_remote_stream_update", &self.stream.is_some())
            .field("on_session_id_received", &self.session_id.is_some())
            .field("on_error", &self.error.is_some())
            .finish()
    }
}

#[async_trait]
impl SessionEventHandler for CallbackSet {
    async fn on_connection_state_change(&self, info: ConnectionStateInfo) {
        if let Some(cb) = &self.state {
            cb(info.state, info.connected);
        }
    }

    async fn on_remote_stream_update(&self, info: RemoteStreamInfo) {
        if let Some(cb) = &self.stream {
            cb(info.kind, info.stream);
        }
    }

    async fn on_session_id_received(&self, session_id: String) {
        if let Some(cb) = &self.session_id {
            cb(session_id);
        }
    }

    async fn on_error(&self, error: SessionError) {
        if let Some(cb) = &self.error {
            cb(error);
        }
    }
}

/// Fans events out to the registered handler and the broadcast channel
pub struct EventEmitter {
    handler: RwLock<Option<Arc<dyn SessionEventHandler>>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            handler: RwLock::new(None),
            event_tx,
        }
    }

    /// Replace the registered handler
    pub async fn set_handler(&self, handler: Arc<dyn SessionEventHandler>) {
        *self.handler.write().await = Some(handler);
    }

    pub async fn has_handler(&self) -> bool {
        self.handler.read().await.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub async fn emit(&self, event: SessionEvent) {
        tracing::trace!(event = event.name(), "Emitting session event");

        // No subscribers is fine
        let _ = self.event_tx.send(event.clone());

        // Don't hold the lock while the host runs; it may re-register
        let handler = self.handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_session_event(event).await;
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

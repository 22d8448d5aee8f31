//! Connection manager handle.
//!
//! [`ConnectionManager`] is a cheap, cloneable handle onto one event
//! loop task. Every method returns immediately; outcomes are observed
//! through [`state`](ConnectionManager::state),
//! [`watch_state`](ConnectionManager::watch_state),
//! [`events`](ConnectionManager::events) or the reserved `connect`,
//! `disconnect` and `connect_error` listeners.
//!
//! # Example
//!
//! ```ignore
//! use docshare_realtime::{ClientEvent, ConnectionManager, Document};
//!
//! let manager = ConnectionManager::builder()
//!     .url("http://localhost:3001")
//!     .build()?;
//!
//! manager.on("newDocument", |doc| println!("created: {doc}"));
//! manager.connect();
//!
//! let sid = manager.wait_connected(Duration::from_secs(5)).await?;
//! manager.emit_event(&ClientEvent::NewDocument(Document::new("d-1", "Deck.pdf")));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::{AckId, SessionId};
use crate::protocol::{ClientEvent, ServerEvent, is_reserved};
use crate::transport::Transport;

use super::builder::ManagerBuilder;
use super::config::ManagerConfig;
use super::event_loop::{Command, EventLoop, Shared};
use super::handshake::Attempt;
use super::listeners::{EventCallback, ListenerRegistry, Subscription};
use super::state::{ConnectionEvent, ConnectionState};

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the manager.
struct ManagerInner {
    /// Validated configuration.
    config: ManagerConfig,

    /// Mailbox into the event loop.
    commands: mpsc::UnboundedSender<Command>,

    /// State published by the event loop.
    shared: Arc<Shared>,

    /// Next acknowledgement id.
    next_ack: AtomicU64,

    /// Set once `dispose()` ran.
    disposed: AtomicBool,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owns one real-time connection and its reconnection policy.
///
/// The manager is responsible for:
/// - Dialing the endpoint and joining the namespace
/// - Retrying with capped exponential backoff after failures
/// - Sending events while connected
/// - Dispatching inbound events to listeners
///
/// Several managers can coexist; nothing is process-global.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

// ============================================================================
// ConnectionManager - Display
// ============================================================================

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .field("retry_count", &self.retry_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Construction
// ============================================================================

impl ConnectionManager {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Creates a manager speaking WebSocket.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Creates a manager over a custom transport.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn with_transport(config: ManagerConfig, transport: impl Transport) -> Result<Self> {
        Self::builder().config(config).transport(transport).build()
    }

    /// Spawns the event loop. `config` is already validated.
    pub(crate) fn start(
        config: ManagerConfig,
        transport: Arc<dyn Transport>,
        listeners: Vec<(String, EventCallback)>,
    ) -> Result<Self> {
        let registry = ListenerRegistry::new();
        for (name, callback) in listeners {
            registry.add(name, callback);
        }

        let template = Attempt {
            transport,
            url: config.endpoint_url()?,
            namespace: config.resolved_namespace(),
            auth: config.auth.clone(),
            connect_timeout: config.connect_timeout,
        };

        let shared = Arc::new(Shared::new(registry));
        let (commands, command_rx) = mpsc::unbounded_channel();

        debug!(url = %template.url, namespace = %template.namespace, "Starting connection manager");
        tokio::spawn(
            EventLoop::new(Arc::clone(&shared), command_rx, template, config.backoff()).run(),
        );

        let manager = Self {
            inner: Arc::new(ManagerInner {
                config,
                commands,
                shared,
                next_ack: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        };

        if manager.inner.config.auto_connect {
            manager.connect();
        }

        Ok(manager)
    }
}

// ============================================================================
// ConnectionManager - Lifecycle
// ============================================================================

impl ConnectionManager {
    /// Starts connecting.
    ///
    /// No-op while connected, connecting or waiting on a retry. From
    /// `Failed` the retry counter starts over.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Closes the connection and cancels any pending retry or attempt.
    ///
    /// Idempotent. The manager stays usable; `connect()` starts over.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Disconnects and stops the event loop. Later calls are no-ops.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Disposing connection manager");
        self.send(Command::Shutdown);
    }

    /// Returns `true` once [`dispose`](Self::dispose) ran.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    fn send(&self, command: Command) -> bool {
        if self.inner.commands.send(command).is_err() {
            debug!("Event loop stopped, command dropped");
            return false;
        }
        true
    }
}

// ============================================================================
// ConnectionManager - Emit
// ============================================================================

impl ConnectionManager {
    /// Sends an event.
    ///
    /// Returns `false`, and logs a warning, if not connected, if `name`
    /// is reserved, or if `payload` does not serialize. Never fails.
    pub fn emit<T>(&self, name: &str, payload: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        if is_reserved(name) {
            warn!(event = %name, "Refusing to emit reserved event");
            return false;
        }

        if !self.is_connected() {
            warn!(event = %name, "Not connected, dropping emit");
            return false;
        }

        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(event = %name, error = %e, "Payload does not serialize, dropping emit");
                return false;
            }
        };

        self.send(Command::Emit {
            name: name.to_string(),
            payload,
        })
    }

    /// Sends a typed application event.
    pub fn emit_event(&self, event: &ClientEvent) -> bool {
        match event.payload() {
            Ok(payload) => self.emit(event.name(), &payload),
            Err(e) => {
                warn!(event = event.name(), error = %e, "Payload does not serialize, dropping emit");
                false
            }
        }
    }

    /// Sends an event and waits for the server's acknowledgement.
    ///
    /// # Errors
    ///
    /// - [`Error::ReservedEvent`] if `name` is reserved
    /// - [`Error::NotConnected`] if offline
    /// - [`Error::AckTimeout`] if no ACK arrives within `ack_timeout`
    /// - [`Error::ConnectionClosed`] if the link drops first
    pub async fn emit_with_ack<T>(
        &self,
        name: &str,
        payload: &T,
        ack_timeout: Duration,
    ) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        if is_reserved(name) {
            return Err(Error::reserved_event(name));
        }
        let payload = serde_json::to_value(payload)?;

        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let ack_id = AckId::new(self.inner.next_ack.fetch_add(1, Ordering::Relaxed));
        let (reply_tx, reply_rx) = oneshot::channel();

        self.inner
            .commands
            .send(Command::EmitWithAck {
                ack_id,
                name: name.to_string(),
                payload,
                reply: reply_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(ack_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.send(Command::CancelAck(ack_id));
                Err(Error::ack_timeout(ack_id, ack_timeout.as_millis() as u64))
            }
        }
    }
}

// ============================================================================
// ConnectionManager - Listen
// ============================================================================

impl ConnectionManager {
    /// Registers `callback` for events named `name`.
    ///
    /// Callbacks for one name run in registration order on the event
    /// loop task; keep them short.
    pub fn on<F>(&self, name: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.shared.listeners.add(name, Arc::new(callback))
    }

    /// Registers a callback receiving the payload deserialized as `T`.
    ///
    /// Payloads that do not match `T` are logged and skipped.
    pub fn on_event<T, F>(&self, name: impl Into<String>, callback: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = name.into();
        let event = name.clone();
        self.on(name, move |payload: &Value| {
            match serde_json::from_value::<T>(payload.clone()) {
                Ok(value) => callback(value),
                Err(e) => warn!(event = %event, error = %e, "Payload does not match listener type"),
            }
        })
    }

    /// Registers a callback for every application event, run after the
    /// named listeners.
    pub fn on_any<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.inner.shared.listeners.add_any(Arc::new(callback))
    }

    /// Registers a callback receiving every application event, parsed.
    pub fn on_server_event<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ServerEvent) + Send + Sync + 'static,
    {
        self.on_any(move |name, payload| callback(ServerEvent::parse(name, payload)))
    }

    /// Number of listeners registered for `name`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner.shared.listeners.count(name)
    }
}

// ============================================================================
// ConnectionManager - State
// ============================================================================

impl ConnectionManager {
    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state.borrow().clone()
    }

    /// Returns `true` when connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.shared.state.borrow().is_connected()
    }

    /// Consecutive failures since the last successful connect.
    #[inline]
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.inner.shared.retry_count.load(Ordering::SeqCst)
    }

    /// Watch receiver for state changes.
    #[inline]
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    /// Receiver for lifecycle transitions from now on.
    #[inline]
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.shared.events.subscribe()
    }

    /// Configuration in use.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Waits until connected.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if not connected within `wait`
    /// - [`Error::Connection`] if the manager gives up first
    /// - [`Error::ConnectionClosed`] if the event loop stopped
    pub async fn wait_connected(&self, wait: Duration) -> Result<SessionId> {
        let mut state = self.watch_state();

        let wait_for_sid = async move {
            loop {
                let current = state.borrow_and_update().clone();
                match current {
                    ConnectionState::Connected { sid } => return Ok(sid),
                    ConnectionState::Failed { attempts } => {
                        return Err(Error::connection(format!(
                            "gave up after {attempts} attempts"
                        )));
                    }
                    _ => {}
                }

                state.changed().await.map_err(|_| Error::ConnectionClosed)?;
            }
        };

        timeout(wait, wait_for_sid)
            .await
            .map_err(|_| Error::connection_timeout(wait.as_millis() as u64))?
    }
}

// ============================================================================
// Tests
// ============================================================================

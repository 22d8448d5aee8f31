//! Manager event loop.
//!
//! One task owns every piece of mutable connection state: the live
//! session, the in-flight connect attempt, the retry timer, the retry
//! counter and the pending acknowledgements. Handles talk to it through
//! an unbounded mailbox and observe it through a watch channel (state)
//! and a broadcast channel (transitions).
//!
//! The loop polls, in priority order:
//!
//! | Source | Effect |
//! |--------|--------|
//! | Mailbox | connect, disconnect, emit, ack bookkeeping, shutdown |
//! | Connect attempt | `on_connect` / `on_connect_error` |
//! | Retry timer | next connect attempt |
//! | Session | inbound frames, link loss, heartbeat expiry |
//!
//! Mailbox first means a `disconnect()` queued before a timer deadline
//! always cancels that timer.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, Sleep, sleep};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{AckId, SessionId};
use crate::protocol::event::{CONNECT, CONNECT_ERROR, DISCONNECT, connect_error_payload};
use crate::protocol::{DisconnectReason, EnginePacket, Packet, PacketType};
use crate::transport::{Link, LinkEvent};

use super::backoff::{BackoffPolicy, RetryDecision};
use super::handshake::{Attempt, Established};
use super::listeners::ListenerRegistry;
use super::state::{ConnectionEvent, ConnectionState};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the lifecycle broadcast channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Command
// ============================================================================

/// Mailbox messages.
pub(crate) enum Command {
    /// Start connecting unless already busy.
    Connect,
    /// Close the link and cancel retries.
    Disconnect,
    /// Send an event.
    Emit { name: String, payload: Value },
    /// Send an event and route the server's ACK to `reply`.
    EmitWithAck {
        ack_id: AckId,
        name: String,
        payload: Value,
        reply: oneshot::Sender<Result<Value>>,
    },
    /// Forget a timed-out acknowledgement.
    CancelAck(AckId),
    /// Disconnect and stop the loop.
    Shutdown,
}

// ============================================================================
// Shared
// ============================================================================

/// State readable from handles.
pub(crate) struct Shared {
    pub state: watch::Sender<ConnectionState>,
    pub events: broadcast::Sender<ConnectionEvent>,
    pub listeners: ListenerRegistry,
    pub retry_count: AtomicU32,
}

impl Shared {
    pub fn new(listeners: ListenerRegistry) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state,
            events,
            listeners,
            retry_count: AtomicU32::new(0),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// A joined namespace.
struct Session {
    link: Link,
    sid: SessionId,
    heartbeat: Pin<Box<Sleep>>,
    window: Duration,
}

impl Session {
    fn touch(&mut self) {
        let deadline = Instant::now() + self.window;
        self.heartbeat.as_mut().reset(deadline);
    }
}

enum SessionSignal {
    Link(LinkEvent),
    HeartbeatExpired,
}

// ============================================================================
// EventLoop
// ============================================================================

pub(crate) struct EventLoop {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    template: Attempt,
    backoff: BackoffPolicy,

    retry_count: u32,
    retry_timer: Option<Pin<Box<Sleep>>>,
    attempt: Option<BoxFuture<'static, Result<Established>>>,
    session: Option<Session>,
    acks: FxHashMap<AckId, oneshot::Sender<Result<Value>>>,
}

impl EventLoop {
    pub fn new(
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
        template: Attempt,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            shared,
            commands,
            template,
            backoff,
            retry_count: 0,
            retry_timer: None,
            attempt: None,
            session: None,
            acks: FxHashMap::default(),
        }
    }

    /// Runs until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown) => {
                            debug!("Shutdown command received");
                            self.disconnect();
                            break;
                        }

                        Some(command) => self.handle_command(command),

                        None => {
                            debug!("Command channel closed");
                            self.disconnect();
                            break;
                        }
                    }
                }

                result = poll_attempt(&mut self.attempt) => {
                    self.attempt = None;
                    match result {
                        Ok(established) => self.on_connect(established),
                        Err(e) => self.on_connect_error(e),
                    }
                }

                () = poll_timer(&mut self.retry_timer) => {
                    self.retry_timer = None;
                    debug!(attempt = self.retry_count, "Retry timer fired");
                    self.start_attempt();
                }

                signal = poll_session(&mut self.session) => {
                    match signal {
                        SessionSignal::Link(event) => self.handle_link_event(event),
                        SessionSignal::HeartbeatExpired => {
                            warn!("No heartbeat from server");
                            self.on_disconnect(DisconnectReason::PingTimeout);
                        }
                    }
                }
            }
        }

        debug!("Event loop terminated");
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),

            Command::Disconnect => self.disconnect(),

            Command::Emit { name, payload } => {
                let Some(session) = &self.session else {
                    warn!(event = %name, "Not connected, dropping emit");
                    return;
                };
                let frame = Packet::event(self.template.namespace.clone(), &name, payload, None)
                    .to_frame();
                trace!(event = %name, "Emitting");
                if let Err(e) = session.link.send(frame) {
                    warn!(event = %name, error = %e, "Emit failed");
                }
            }

            Command::EmitWithAck {
                ack_id,
                name,
                payload,
                reply,
            } => {
                let Some(session) = &self.session else {
                    let _ = reply.send(Err(Error::NotConnected));
                    return;
                };
                let frame = Packet::event(
                    self.template.namespace.clone(),
                    &name,
                    payload,
                    Some(ack_id),
                )
                .to_frame();

                match session.link.send(frame) {
                    Ok(()) => {
                        trace!(event = %name, %ack_id, "Emitting with ack");
                        self.acks.insert(ack_id, reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            Command::CancelAck(ack_id) => {
                if self.acks.remove(&ack_id).is_some() {
                    debug!(%ack_id, "Removed timed-out ack");
                }
            }

            // Handled in `run`.
            Command::Shutdown => {}
        }
    }

    fn connect(&mut self) {
        if self.session.is_some() || self.attempt.is_some() || self.retry_timer.is_some() {
            let state = self.shared.state.borrow().clone();
            debug!(%state, "Connect ignored");
            return;
        }

        let failed = self.shared.state.borrow().is_terminal();
        if failed {
            self.set_retry_count(0);
        }

        self.start_attempt();
    }

    fn disconnect(&mut self) {
        if self.retry_timer.take().is_some() {
            debug!("Cancelled retry timer");
        }
        if self.attempt.take().is_some() {
            debug!("Abandoned connect attempt");
        }
        self.set_retry_count(0);

        if let Some(session) = self.session.take() {
            let _ = session
                .link
                .send(Packet::disconnect(self.template.namespace.clone()).to_frame());
            drop(session);
            self.on_disconnect(DisconnectReason::IoClientDisconnect);
        } else {
            self.publish(ConnectionState::Disconnected);
        }
    }

    fn start_attempt(&mut self) {
        info!(attempt = self.retry_count + 1, url = %self.template.url, "Connecting");
        self.publish(ConnectionState::Connecting);
        self.broadcast(ConnectionEvent::Connecting);
        self.attempt = Some(Box::pin(self.template.clone().run()));
    }

    // ========================================================================
    // Lifecycle Hooks
    // ========================================================================

    fn on_connect(&mut self, established: Established) {
        let Established {
            link,
            handshake,
            sid,
        } = established;

        self.set_retry_count(0);
        self.retry_timer = None;

        let window = handshake.heartbeat_window();
        self.session = Some(Session {
            link,
            sid: sid.clone(),
            heartbeat: Box::pin(sleep(window)),
            window,
        });

        info!(%sid, "Connected");
        self.publish(ConnectionState::Connected { sid: sid.clone() });
        self.broadcast(ConnectionEvent::Connected { sid });
        self.shared.listeners.dispatch(CONNECT, &Value::Null);
    }

    fn on_disconnect(&mut self, reason: DisconnectReason) {
        if let Some(session) = self.session.take() {
            debug!(sid = %session.sid, "Session closed");
        }
        self.fail_pending_acks();

        info!(%reason, "Disconnected");
        self.broadcast(ConnectionEvent::Disconnected { reason });
        self.shared
            .listeners
            .dispatch(DISCONNECT, &Value::String(reason.as_str().to_string()));

        if reason.is_transport_loss() {
            self.record_failure(reason.as_str().to_string());
        } else if reason == DisconnectReason::IoServerDisconnect {
            self.start_attempt();
        } else {
            self.publish(ConnectionState::Disconnected);
        }
    }

    fn on_connect_error(&mut self, error: Error) {
        let message = error.to_string();
        warn!(error = %message, "Connect attempt failed");

        self.shared
            .listeners
            .dispatch(CONNECT_ERROR, &connect_error_payload(&message));
        self.record_failure(message);
    }

    fn record_failure(&mut self, message: String) {
        let attempt = self.retry_count.saturating_add(1);
        self.set_retry_count(attempt);
        self.broadcast(ConnectionEvent::ConnectError { attempt, message });

        match self.backoff.decide(attempt) {
            RetryDecision::Retry { attempt, delay } => {
                info!(attempt, delay_ms = delay.as_millis() as u64, "Retry scheduled");
                self.retry_timer = Some(Box::pin(sleep(delay)));
                self.publish(ConnectionState::Retrying { attempt, delay });
                self.broadcast(ConnectionEvent::RetryScheduled { attempt, delay });
            }

            RetryDecision::GiveUp { attempts } => {
                error!(attempts, "Giving up on connection");
                self.retry_timer = None;
                self.publish(ConnectionState::Failed { attempts });
                self.broadcast(ConnectionEvent::RetriesExhausted { attempts });
            }
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Frame(frame) => self.handle_frame(&frame),
            LinkEvent::Closed => self.on_disconnect(DisconnectReason::TransportClose),
            LinkEvent::Failed(message) => {
                warn!(error = %message, "Transport failed");
                self.on_disconnect(DisconnectReason::TransportError);
            }
        }
    }

    fn handle_frame(&mut self, frame: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.touch();

        let packet = match EnginePacket::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, %frame, "Undecodable engine frame");
                self.on_disconnect(DisconnectReason::ParseError);
                return;
            }
        };

        match packet {
            EnginePacket::Ping => {
                trace!("Ping");
                if let Err(e) = session.link.send(EnginePacket::Pong.encode()) {
                    debug!(error = %e, "Pong not sent");
                }
            }
            EnginePacket::Close => self.on_disconnect(DisconnectReason::TransportClose),
            EnginePacket::Message(body) => self.handle_message(&body),
            EnginePacket::Open(_) => warn!("Unexpected engine open on live session"),
            EnginePacket::Pong | EnginePacket::Noop | EnginePacket::Upgrade => {}
        }
    }

    fn handle_message(&mut self, body: &str) {
        let packet = match Packet::decode(body) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, %body, "Undecodable packet");
                self.on_disconnect(DisconnectReason::ParseError);
                return;
            }
        };

        if packet.namespace != self.template.namespace {
            trace!(namespace = %packet.namespace, "Ignoring packet for other namespace");
            return;
        }

        match packet.packet_type {
            PacketType::Event => {
                let Some((name, payload)) = packet.event_parts() else {
                    warn!(%body, "EVENT without a name");
                    return;
                };
                if let Some(ack_id) = packet.ack_id {
                    debug!(event = %name, %ack_id, "Server requested an ack; not answered");
                }

                let handled = self.shared.listeners.dispatch(name, &payload);
                trace!(event = %name, listeners = handled, "Dispatched");
                self.shared.listeners.dispatch_any(name, &payload);
            }

            PacketType::Ack => {
                let Some(ack_id) = packet.ack_id else {
                    warn!(%body, "ACK without an id");
                    return;
                };
                match self.acks.remove(&ack_id) {
                    Some(reply) => {
                        let _ = reply.send(Ok(packet.ack_payload().unwrap_or(Value::Null)));
                    }
                    None => warn!(%ack_id, "ACK for unknown id"),
                }
            }

            PacketType::Disconnect => self.on_disconnect(DisconnectReason::IoServerDisconnect),

            PacketType::ConnectError => {
                warn!(
                    message = packet.connect_error_message().as_deref().unwrap_or(""),
                    "CONNECT_ERROR on live session"
                );
            }

            PacketType::Connect => trace!("Duplicate CONNECT"),

            // Rejected by the decoder.
            PacketType::BinaryEvent | PacketType::BinaryAck => {}
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn fail_pending_acks(&mut self) {
        if self.acks.is_empty() {
            return;
        }
        debug!(pending = self.acks.len(), "Failing pending acks");
        for (_, reply) in self.acks.drain() {
            let _ = reply.send(Err(Error::ConnectionClosed));
        }
    }

    fn set_retry_count(&mut self, count: u32) {
        self.retry_count = count;
        self.shared.retry_count.store(count, Ordering::SeqCst);
    }

    fn publish(&self, state: ConnectionState) {
        trace!(%state, "State");
        self.shared.state.send_replace(state);
    }

    fn broadcast(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.shared.events.send(event);
    }
}

// ============================================================================
// Optional Futures
// ============================================================================

async fn poll_attempt(
    attempt: &mut Option<BoxFuture<'static, Result<Established>>>,
) -> Result<Established> {
    match attempt {
        Some(future) => future.as_mut().await,
        None => pending().await,
    }
}

async fn poll_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn poll_session(session: &mut Option<Session>) -> SessionSignal {
    let Some(session) = session else {
        return pending().await;
    };

    tokio::select! {
        event = session.link.recv() => SessionSignal::Link(event),
        () = session.heartbeat.as_mut() => SessionSignal::HeartbeatExpired,
    }
}

//! JSTP connection state machine
//!
//! A [`Connection`] owns the outbound queue and session identity for one
//! logical JSTP session and survives any number of transport reconnects.
//!
//! ```text
//!  Disconnected ──handshake──▶ Connecting ──{handshake, ok}──▶ Connected
//!       ▲                         │                              │
//!       └────{handshake, error}───┘◀──────transport closed───────┘
//!
//!  close() from any state ──▶ Closed
//! ```
//!
//! State, queue, policies and the receive buffer live behind one lock.
//! Transport and policy calls happen while it is held, listener callbacks
//! after it is released.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use jstp_core::{
    encode_packet, Object, PacketBuffer, Value, ERROR_KEY, HANDSHAKE_KEY, OK_KEY, SESSION_KEY,
};
use jstp_transport::{Transport, TransportError, TransportListener};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::error::{ClientError, Result};
use crate::policy::{
    DropRestorationPolicy, RestorationPolicy, SessionData, SessionPolicy, SimpleSessionPolicy,
};

/// Lifecycle state of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Handshake sent, reply pending
    Connecting,
    Connected,
    /// Terminal
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Application-side observer of a [`Connection`]
///
/// Callbacks run without the connection lock held, so they may call back
/// into the connection.
pub trait ConnectionListener: Send + Sync {
    /// Handshake accepted; `restored` is true when the previous session resumed
    fn on_connected(&self, _restored: bool) {}

    fn on_packet(&self, _packet: &Object) {}

    fn on_connection_closed(&self, _reason: Option<&str>) {}

    fn on_connection_error(&self, _error: &ClientError) {}
}

/// Locked view of a connection handed to policies
pub struct ConnectionHandle {
    state: ConnectionState,
    transport: Option<Arc<dyn Transport>>,
    app_name: Option<String>,
    session_id: Option<String>,
    session: Box<dyn SessionPolicy>,
}

impl ConnectionHandle {
    /// Send `{handshake:[app_name], session:id}`
    ///
    /// Does nothing while another handshake is waiting for its reply. The
    /// packet is sent over the live transport, or opens it when it is down.
    pub fn handshake(&mut self, app_name: &str, session_id: Option<&str>) -> Result<()> {
        match self.state {
            ConnectionState::Closed => return Err(ClientError::Closed),
            ConnectionState::Connecting => {
                debug!("Handshake already in flight, skipping");
                return Ok(());
            }
            _ => {}
        }
        let transport = self.transport.clone().ok_or(ClientError::NoTransport)?;

        let mut packet = Object::new().with(HANDSHAKE_KEY, vec![app_name]);
        if let Some(id) = session_id {
            packet.insert(SESSION_KEY, id);
        }
        let text = encode_packet(&packet);

        self.app_name = Some(app_name.to_string());
        self.session_id = session_id.map(str::to_string);
        self.session.on_handshake(app_name, session_id);
        self.set_state(ConnectionState::Connecting);

        info!("Handshake as {} (session: {:?})", app_name, session_id);
        let sent = if transport.is_connected() {
            transport.send_message(&text)
        } else {
            transport.open_connection(&text)
        };
        if let Err(e) = sent {
            warn!("Handshake failed: {}", e);
            self.set_state(ConnectionState::Disconnected);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn transport_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Connection {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn transmit(&mut self, packet: &Object) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(ClientError::NoTransport)?;
        transport.send_message(&encode_packet(packet))?;
        let seq = self.session.on_message_sent(packet);
        trace!("Sent packet #{}", seq);
        Ok(())
    }

    /// Send queued packets in order, stopping at the first failure
    fn flush(&mut self, queue: &mut VecDeque<Object>) -> Result<()> {
        while let Some(packet) = queue.pop_front() {
            if let Err(e) = self.transmit(&packet) {
                warn!("Send failed, {} packets stay queued: {}", queue.len() + 1, e);
                queue.push_front(packet);
                return Err(e);
            }
        }
        Ok(())
    }
}

struct Inner {
    handle: ConnectionHandle,
    queue: VecDeque<Object>,
    restoration: Box<dyn RestorationPolicy>,
    buffer: PacketBuffer,
}

/// Deferred listener notification
enum Notice {
    Connected(bool),
    Packet(Object),
    Closed(Option<String>),
    Error(ClientError),
}

/// A JSTP connection over an externally supplied transport
pub struct Connection {
    inner: Mutex<Inner>,
    listeners: RwLock<Vec<Arc<dyn ConnectionListener>>>,
}

impl Connection {
    /// Create a connection with the drop restoration policy and the simple
    /// session policy
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::from_parts(
            transport,
            None,
            None,
            Box::new(DropRestorationPolicy::default()),
            Box::new(SimpleSessionPolicy::default()),
        )
    }

    pub(crate) fn from_parts(
        transport: Arc<dyn Transport>,
        app_name: Option<String>,
        session_id: Option<String>,
        restoration: Box<dyn RestorationPolicy>,
        session: Box<dyn SessionPolicy>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                handle: ConnectionHandle {
                    state: ConnectionState::Disconnected,
                    transport: Some(transport),
                    app_name,
                    session_id,
                    session,
                },
                queue: VecDeque::new(),
                restoration,
                buffer: PacketBuffer::new(),
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.listeners.write().push(listener);
    }

    pub fn set_restoration_policy(&self, policy: Box<dyn RestorationPolicy>) {
        self.inner.lock().restoration = policy;
    }

    pub fn set_session_policy(&self, policy: Box<dyn SessionPolicy>) {
        self.inner.lock().handle.session = policy;
    }

    /// Detach the current transport and attach `transport`
    ///
    /// The old transport is left open. Any session on it ends here; the next
    /// `on_transport_connected` lets the restoration policy pick it up again.
    pub fn set_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.handle.state == ConnectionState::Closed {
            return Err(ClientError::Closed);
        }
        inner.handle.transport = Some(transport);
        inner.handle.set_state(ConnectionState::Disconnected);
        inner.buffer.clear();
        Ok(())
    }

    /// Start a session for `app_name`, resuming `session_id` if given
    pub fn handshake(&self, app_name: &str, session_id: Option<&str>) -> Result<()> {
        self.inner.lock().handle.handshake(app_name, session_id)
    }

    /// Send `packet` now if connected, otherwise queue it
    ///
    /// A packet the transport refuses goes back to the head of the queue and
    /// the transport error is returned.
    pub fn send(&self, packet: Object) -> Result<()> {
        let mut inner = self.inner.lock();
        let Inner { handle, queue, .. } = &mut *inner;
        match handle.state {
            ConnectionState::Closed => Err(ClientError::Closed),
            ConnectionState::Connected => {
                queue.push_back(packet);
                handle.flush(queue)
            }
            _ => {
                trace!("Queueing packet while {}", handle.state);
                queue.push_back(packet);
                Ok(())
            }
        }
    }

    /// The transport came up
    pub fn on_transport_connected(&self) {
        let result = {
            let mut inner = self.inner.lock();
            let Inner {
                handle,
                restoration,
                ..
            } = &mut *inner;

            match handle.state {
                ConnectionState::Closed => return,
                ConnectionState::Connecting => {
                    debug!("Transport connected with handshake in flight");
                    return;
                }
                _ => {}
            }
            let Some(app_name) = handle.app_name.clone() else {
                debug!("Transport connected before any handshake");
                return;
            };
            let session_id = handle.session_id.clone();
            restoration.on_transport_available(handle, &app_name, session_id.as_deref())
        };

        if let Err(e) = result {
            self.notify(vec![Notice::Error(e)]);
        }
    }

    /// The transport went down
    pub fn on_transport_closed(&self, error: Option<&TransportError>) {
        {
            let mut inner = self.inner.lock();
            let Inner {
                handle,
                queue,
                restoration,
                buffer,
            } = &mut *inner;
            if handle.state == ConnectionState::Closed {
                return;
            }

            info!("Transport closed: {:?}", error);
            handle.set_state(ConnectionState::Disconnected);
            buffer.clear();
            if !restoration.restore(handle, queue) {
                queue.clear();
            }
        }

        let reason = error.map(|e| e.to_string());
        self.notify(vec![Notice::Closed(reason)]);
    }

    /// Bytes arrived from the transport
    pub fn on_message_received(&self, data: &[u8]) {
        let mut notices = Vec::new();
        {
            let mut inner = self.inner.lock();
            let Inner {
                handle,
                queue,
                buffer,
                ..
            } = &mut *inner;
            if handle.state == ConnectionState::Closed {
                return;
            }

            buffer.extend(data);
            match buffer.drain_packets() {
                Ok(packets) => {
                    for packet in packets {
                        Self::dispatch(handle, queue, packet, &mut notices);
                    }
                }
                Err(e) => {
                    warn!("Dropping corrupted input: {}", e);
                    buffer.clear();
                    notices.push(Notice::Error(e.into()));
                }
            }
        }
        self.notify(notices);
    }

    fn dispatch(
        handle: &mut ConnectionHandle,
        queue: &mut VecDeque<Object>,
        packet: Object,
        notices: &mut Vec<Notice>,
    ) {
        if handle.state != ConnectionState::Connecting || !packet.contains_key(HANDSHAKE_KEY) {
            let count = handle.session.on_message_received(&packet);
            trace!("Received packet #{}", count);
            notices.push(Notice::Packet(packet));
            return;
        }

        if let Some(reason) = packet.get(ERROR_KEY) {
            warn!("Handshake rejected: {}", reason);
            handle.set_state(ConnectionState::Disconnected);
            notices.push(Notice::Error(ClientError::HandshakeRejected(text_of(reason))));
            return;
        }

        let Some(ok) = packet.get(OK_KEY) else {
            warn!("Handshake reply without result: {}", packet);
            handle.set_state(ConnectionState::Disconnected);
            notices.push(Notice::Error(ClientError::HandshakeRejected(packet.to_string())));
            return;
        };

        let session_id = text_of(ok);
        let resumed = handle.session_id.as_deref() == Some(session_id.as_str());
        info!("Session {} {}", session_id, if resumed { "resumed" } else { "started" });

        handle.session.on_session_established(&session_id, resumed);
        handle.session_id = Some(session_id);
        handle.set_state(ConnectionState::Connected);

        if let Err(e) = handle.flush(queue) {
            notices.push(Notice::Error(e));
        }
        notices.push(Notice::Connected(resumed));
    }

    pub fn pause(&self, clear: bool) {
        let transport = self.inner.lock().handle.transport.clone();
        if let Some(transport) = transport {
            transport.pause(clear);
        }
    }

    pub fn resume(&self, clear: bool) {
        let transport = self.inner.lock().handle.transport.clone();
        if let Some(transport) = transport {
            transport.resume(clear);
        }
    }

    /// Discard the queue, close and detach the transport
    ///
    /// Later calls are no-ops.
    pub fn close(&self) {
        let transport = {
            let mut inner = self.inner.lock();
            if inner.handle.state == ConnectionState::Closed {
                return;
            }
            inner.queue.clear();
            inner.buffer.clear();
            inner.handle.set_state(ConnectionState::Closed);
            inner.handle.transport.take()
        };

        info!("Connection closed");
        if let Some(transport) = transport {
            transport.close();
        }
        self.notify(vec![Notice::Closed(None)]);
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().handle.state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.lock().handle.session_id.clone()
    }

    pub fn app_name(&self) -> Option<String> {
        self.inner.lock().handle.app_name.clone()
    }

    /// Snapshot of the session policy's data
    pub fn session(&self) -> SessionData {
        self.inner.lock().handle.session.session().clone()
    }

    /// Packets waiting to be sent
    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    fn notify(&self, notices: Vec<Notice>) {
        if notices.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for notice in &notices {
            for listener in &listeners {
                match notice {
                    Notice::Connected(restored) => listener.on_connected(*restored),
                    Notice::Packet(packet) => listener.on_packet(packet),
                    Notice::Closed(reason) => listener.on_connection_closed(reason.as_deref()),
                    Notice::Error(e) => listener.on_connection_error(e),
                }
            }
        }
    }
}

impl TransportListener for Connection {
    fn on_connect(&self) {
        self.on_transport_connected();
    }

    fn on_message_received(&self, data: &[u8]) {
        Connection::on_message_received(self, data);
    }

    fn on_connection_closed(&self, error: Option<&TransportError>) {
        self.on_transport_closed(error);
    }
}

/// String payload as is, anything else in wire form
fn text_of(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

//! Session and restoration policies
//!
//! Policies are owned by a [`Connection`](crate::Connection) and called while
//! its state lock is held. They never keep a reference to the connection;
//! whatever they may act on is passed into each call, restoration policies
//! getting a [`ConnectionHandle`] to re-handshake through.

use std::collections::VecDeque;

use jstp_core::Object;
use tracing::debug;

use crate::connection::ConnectionHandle;
use crate::error::Result;

/// Identity and counters of the current session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    pub app_name: Option<String>,
    pub session_id: Option<String>,
    /// Messages sent in this session
    pub sent: u64,
    /// Messages received in this session
    pub received: u64,
}

/// Message sequencing for one connection
pub trait SessionPolicy: Send {
    /// A handshake for `app_name` is about to be sent
    fn on_handshake(&mut self, app_name: &str, session_id: Option<&str>);

    /// The server accepted the handshake
    fn on_session_established(&mut self, session_id: &str, resumed: bool);

    /// Returns the sequence number assigned to `packet`
    fn on_message_sent(&mut self, packet: &Object) -> u64;

    /// Returns the number of packets received so far
    fn on_message_received(&mut self, packet: &Object) -> u64;

    fn session(&self) -> &SessionData;
}

/// Counts packets in each direction
///
/// Counters restart with every new session and carry over when a session is
/// resumed.
#[derive(Debug, Default)]
pub struct SimpleSessionPolicy {
    data: SessionData,
}

impl SimpleSessionPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionPolicy for SimpleSessionPolicy {
    fn on_handshake(&mut self, app_name: &str, _session_id: Option<&str>) {
        self.data.app_name = Some(app_name.to_string());
    }

    fn on_session_established(&mut self, session_id: &str, resumed: bool) {
        if !resumed {
            self.data.sent = 0;
            self.data.received = 0;
        }
        self.data.session_id = Some(session_id.to_string());
    }

    fn on_message_sent(&mut self, _packet: &Object) -> u64 {
        self.data.sent += 1;
        self.data.sent
    }

    fn on_message_received(&mut self, _packet: &Object) -> u64 {
        self.data.received += 1;
        self.data.received
    }

    fn session(&self) -> &SessionData {
        &self.data
    }
}

/// Recovery behaviour across transport churn
pub trait RestorationPolicy: Send {
    /// The transport closed; return `false` to discard `queue`
    fn restore(&mut self, conn: &mut ConnectionHandle, queue: &mut VecDeque<Object>) -> bool;

    /// The transport is usable again and no handshake is in flight
    fn on_transport_available(
        &mut self,
        conn: &mut ConnectionHandle,
        app_name: &str,
        session_id: Option<&str>,
    ) -> Result<()>;
}

/// Forgets everything on disconnect and starts a fresh session
#[derive(Debug, Clone)]
pub struct DropRestorationPolicy {
    reconnect_when_transport_ready: bool,
}

impl DropRestorationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a returning transport triggers a new handshake
    pub fn reconnect_when_transport_ready(mut self, enabled: bool) -> Self {
        self.reconnect_when_transport_ready = enabled;
        self
    }

    pub fn reconnects(&self) -> bool {
        self.reconnect_when_transport_ready
    }
}

impl Default for DropRestorationPolicy {
    fn default() -> Self {
        Self {
            reconnect_when_transport_ready: true,
        }
    }
}

impl RestorationPolicy for DropRestorationPolicy {
    fn restore(&mut self, _conn: &mut ConnectionHandle, queue: &mut VecDeque<Object>) -> bool {
        if !queue.is_empty() {
            debug!("Dropping {} queued packets", queue.len());
        }
        queue.clear();
        false
    }

    fn on_transport_available(
        &mut self,
        conn: &mut ConnectionHandle,
        app_name: &str,
        _session_id: Option<&str>,
    ) -> Result<()> {
        if self.reconnect_when_transport_ready {
            conn.handshake(app_name, None)
        } else {
            Ok(())
        }
    }
}

/// Keeps queued packets and resumes the previous session
#[derive(Debug, Clone, Default)]
pub struct SessionRestorationPolicy;

impl SessionRestorationPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl RestorationPolicy for SessionRestorationPolicy {
    fn restore(&mut self, _conn: &mut ConnectionHandle, queue: &mut VecDeque<Object>) -> bool {
        debug!("Keeping {} queued packets for resend", queue.len());
        true
    }

    fn on_transport_available(
        &mut self,
        conn: &mut ConnectionHandle,
        app_name: &str,
        session_id: Option<&str>,
    ) -> Result<()> {
        conn.handshake(app_name, session_id)
    }
}

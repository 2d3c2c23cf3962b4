//! Common test helpers and utilities for JSTP tests
//!
//! This crate provides:
//! - A scriptable in-process transport ([`MockTransport`])
//! - A listener recording everything a connection reports ([`RecordingListener`])
//! - Helpers driving transport lifecycle events into a connection
//! - Condition-based waiting for async tests
//! - Tracing setup honouring `RUST_LOG`

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jstp_client::{ClientError, Connection, ConnectionListener};
use jstp_core::{encode_packet, Object, Value, ERROR_KEY, HANDSHAKE_KEY, OK_KEY};
use jstp_transport::{Result as TransportResult, Transport, TransportConfig, TransportError};
use parking_lot::Mutex;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Tracing
// ============================================================================

/// Install a fmt subscriber filtered by `RUST_LOG`; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Poll `check` until it holds or `max_wait` elapses
pub async fn wait_until<F>(check: F, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check() {
            return true;
        }
        tokio::time::sleep(DEFAULT_CHECK_INTERVAL).await;
    }
    check()
}

// ============================================================================
// Mock Transport
// ============================================================================

/// Everything a [`MockTransport`] was asked to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Open(String),
    Send(String),
    Pause(bool),
    Resume(bool),
    Close,
}

/// Transport double that records calls and never calls back
///
/// Connectivity is toggled by the test (see [`simulate_connect`]). Opening a
/// connection does not connect it.
#[derive(Debug, Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    connected: AtomicBool,
    closed: AtomicBool,
    fail_sends: AtomicBool,
    endpoint: Mutex<TransportConfig>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make `send_message` fail until switched off again
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    /// Texts passed to `send_message`, terminators stripped
    pub fn sent(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send(text) => Some(strip(text)),
                _ => None,
            })
            .collect()
    }

    /// Texts passed to `open_connection`, terminators stripped
    pub fn opened(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Open(text) => Some(strip(text)),
                _ => None,
            })
            .collect()
    }

    /// Handshake packets sent either way
    pub fn handshakes(&self) -> Vec<Object> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Open(text) | TransportCall::Send(text) => {
                    jstp_core::parse_object(&strip(text)).ok()
                }
                _ => None,
            })
            .filter(|packet| packet.contains_key(HANDSHAKE_KEY))
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == TransportCall::Close)
            .count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

fn strip(text: &str) -> String {
    text.trim_end_matches('\0').to_string()
}

impl Transport for MockTransport {
    fn open_connection(&self, handshake: &str) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.calls.lock().push(TransportCall::Open(handshake.to_string()));
        Ok(())
    }

    fn send_message(&self, message: &str) -> TransportResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("mock failure".to_string()));
        }
        self.calls.lock().push(TransportCall::Send(message.to_string()));
        Ok(())
    }

    fn pause(&self, clear: bool) {
        self.calls.lock().push(TransportCall::Pause(clear));
    }

    fn resume(&self, clear: bool) {
        self.calls.lock().push(TransportCall::Resume(clear));
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.calls.lock().push(TransportCall::Close);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn host(&self) -> String {
        self.endpoint.lock().host.clone()
    }

    fn port(&self) -> u16 {
        self.endpoint.lock().port
    }

    fn is_tls_enabled(&self) -> bool {
        self.endpoint.lock().tls
    }

    fn set_host(&self, host: &str) {
        self.endpoint.lock().host = host.to_string();
    }

    fn set_port(&self, port: u16) {
        self.endpoint.lock().port = port;
    }

    fn set_tls_enabled(&self, enabled: bool) {
        self.endpoint.lock().tls = enabled;
    }
}

// ============================================================================
// Lifecycle Simulation
// ============================================================================

/// Mark the transport connected and tell the connection
pub fn simulate_connect(connection: &Connection, transport: &MockTransport) {
    transport.set_connected(true);
    connection.on_transport_connected();
}

/// Mark the transport disconnected and tell the connection
pub fn simulate_disconnect(connection: &Connection, transport: &MockTransport) {
    transport.set_connected(false);
    connection.on_transport_closed(None);
}

/// Framed server reply accepting a handshake
pub fn handshake_ok(session_id: &str) -> Vec<u8> {
    let reply = Object::new()
        .with(HANDSHAKE_KEY, Value::Array(vec![]))
        .with(OK_KEY, session_id);
    encode_packet(&reply).into_bytes()
}

/// Framed server reply rejecting a handshake
pub fn handshake_error(reason: &str) -> Vec<u8> {
    let reply = Object::new()
        .with(HANDSHAKE_KEY, Value::Array(vec![]))
        .with(ERROR_KEY, reason);
    encode_packet(&reply).into_bytes()
}

/// Frame a packet the way a server would
pub fn packet_bytes(packet: &Object) -> Vec<u8> {
    encode_packet(packet).into_bytes()
}

// ============================================================================
// Recording Listener
// ============================================================================

/// Notification seen by a [`RecordingListener`]
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Connected(bool),
    Packet(Object),
    Closed(Option<String>),
    Error(ClientError),
}

/// Listener collecting notifications with thread-safe access
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
    count: AtomicU32,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, event: ListenerEvent) {
        self.events.lock().push(event);
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    pub fn packets(&self) -> Vec<Object> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ListenerEvent::Packet(packet) => Some(packet.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<ClientError> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ListenerEvent::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait for at least `n` notifications
    pub async fn wait_for_count(&self, n: u32, max_wait: Duration) -> bool {
        wait_until(|| self.count() >= n, max_wait).await
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

impl ConnectionListener for RecordingListener {
    fn on_connected(&self, restored: bool) {
        self.record(ListenerEvent::Connected(restored));
    }

    fn on_packet(&self, packet: &Object) {
        self.record(ListenerEvent::Packet(packet.clone()));
    }

    fn on_connection_closed(&self, reason: Option<&str>) {
        self.record(ListenerEvent::Closed(reason.map(str::to_string)));
    }

    fn on_connection_error(&self, error: &ClientError) {
        self.record(ListenerEvent::Error(error.clone()));
    }
}

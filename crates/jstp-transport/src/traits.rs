//! Transport capability definitions
//!
//! A [`Transport`] moves already-framed JSTP text to the remote side and
//! reports lifecycle changes to a [`TransportListener`]. Implementations must
//! not call back into the listener from inside their own methods: the
//! connection invokes transport methods while holding its state lock.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, TransportError};

/// Events that can occur on a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection established
    Connected,
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Data received
    Data(Bytes),
    /// Error occurred
    Error(String),
}

/// Endpoint settings of a transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: false,
        }
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }
}

/// Byte stream carrying JSTP packets
pub trait Transport: Send + Sync {
    /// Open the underlying connection and send `handshake` as its first message
    fn open_connection(&self, handshake: &str) -> Result<()>;

    /// Hand a framed message to the transport; may complete asynchronously
    fn send_message(&self, message: &str) -> Result<()>;

    /// Stop delivering traffic; `clear` drops anything held meanwhile
    fn pause(&self, clear: bool);

    /// Resume delivering traffic; `clear` drops anything held while paused
    fn resume(&self, clear: bool);

    fn close(&self);

    fn is_connected(&self) -> bool;

    fn is_closed(&self) -> bool;

    fn host(&self) -> String;

    fn port(&self) -> u16;

    fn is_tls_enabled(&self) -> bool;

    /// Endpoint changes apply to the next `open_connection`
    fn set_host(&self, host: &str);

    fn set_port(&self, port: u16);

    fn set_tls_enabled(&self, enabled: bool);
}

/// Receiver of transport lifecycle callbacks
pub trait TransportListener: Send + Sync {
    fn on_connect(&self);

    fn on_message_received(&self, data: &[u8]);

    fn on_connection_closed(&self, error: Option<&TransportError>);
}

/// Trait for receiving data
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Option<TransportEvent>;
}

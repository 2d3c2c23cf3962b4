//! In-memory transport over tokio channels
//!
//! [`ChannelTransport::pair`] returns the transport handed to a connection,
//! the [`ChannelPeer`] playing the remote side, and a [`ChannelReceiver`]
//! carrying lifecycle events for [`crate::pump_events`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportConfig, TransportEvent, TransportReceiver};

#[derive(Debug, Default)]
struct ChannelState {
    connected: bool,
    closed: bool,
    paused: bool,
    /// Messages sent while paused
    held: Vec<Bytes>,
}

/// Transport whose remote side is a [`ChannelPeer`]
pub struct ChannelTransport {
    config: Mutex<TransportConfig>,
    state: Arc<Mutex<ChannelState>>,
    outgoing: mpsc::UnboundedSender<Bytes>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

/// Remote end of a [`ChannelTransport`]
pub struct ChannelPeer {
    state: Arc<Mutex<ChannelState>>,
    outgoing: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

/// Lifecycle events of a [`ChannelTransport`]
pub struct ChannelReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl ChannelTransport {
    pub fn pair(config: TransportConfig) -> (ChannelTransport, ChannelPeer, ChannelReceiver) {
        let state = Arc::new(Mutex::new(ChannelState::default()));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let transport = ChannelTransport {
            config: Mutex::new(config),
            state: state.clone(),
            outgoing: outgoing_tx,
            events: events_tx.clone(),
        };
        let peer = ChannelPeer {
            state,
            outgoing: outgoing_rx,
            events: events_tx,
        };
        (transport, peer, ChannelReceiver { rx: events_rx })
    }

    fn push(&self, data: Bytes) -> Result<()> {
        self.outgoing
            .send(data)
            .map_err(|_| TransportError::SendFailed("peer dropped".to_string()))
    }
}

impl Transport for ChannelTransport {
    fn open_connection(&self, handshake: &str) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransportError::Closed);
            }
            state.connected = true;
        }
        {
            let config = self.config.lock();
            info!("Channel transport open to {}:{}", config.host, config.port);
        }
        self.push(Bytes::copy_from_slice(handshake.as_bytes()))?;
        let _ = self.events.send(TransportEvent::Connected);
        Ok(())
    }

    fn send_message(&self, message: &str) -> Result<()> {
        let data = Bytes::copy_from_slice(message.as_bytes());
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.paused {
            state.held.push(data);
            return Ok(());
        }
        drop(state);
        self.push(data)
    }

    fn pause(&self, clear: bool) {
        let mut state = self.state.lock();
        state.paused = true;
        if clear {
            state.held.clear();
        }
    }

    fn resume(&self, clear: bool) {
        let held = {
            let mut state = self.state.lock();
            state.paused = false;
            std::mem::take(&mut state.held)
        };
        if clear {
            debug!("Dropping {} held messages on resume", held.len());
            return;
        }
        for data in held {
            if self.push(data).is_err() {
                break;
            }
        }
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.connected = false;
        state.held.clear();
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn host(&self) -> String {
        self.config.lock().host.clone()
    }

    fn port(&self) -> u16 {
        self.config.lock().port
    }

    fn is_tls_enabled(&self) -> bool {
        self.config.lock().tls
    }

    fn set_host(&self, host: &str) {
        self.config.lock().host = host.to_string();
    }

    fn set_port(&self, port: u16) {
        self.config.lock().port = port;
    }

    fn set_tls_enabled(&self, enabled: bool) {
        self.config.lock().tls = enabled;
    }
}

impl ChannelPeer {
    /// Next message the transport sent
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outgoing.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.outgoing.try_recv().ok()
    }

    /// Accept (or re-establish) the connection
    pub fn connect(&self) {
        self.state.lock().connected = true;
        let _ = self.events.send(TransportEvent::Connected);
    }

    /// Deliver bytes to the transport's listener
    pub fn deliver(&self, data: impl Into<Bytes>) {
        let _ = self.events.send(TransportEvent::Data(data.into()));
    }

    pub fn disconnect(&self, reason: Option<&str>) {
        self.state.lock().connected = false;
        let _ = self.events.send(TransportEvent::Disconnected {
            reason: reason.map(str::to_string),
        });
    }

    pub fn fail(&self, error: &str) {
        let _ = self.events.send(TransportEvent::Error(error.to_string()));
    }
}

#[async_trait]
impl TransportReceiver for ChannelReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

//! JSTP Transport Layer
//!
//! Capability traits the JSTP connection is written against:
//! - [`Transport`]: open/send/pause/resume/close plus endpoint accessors
//! - [`TransportListener`]: connect, message and close notifications
//!
//! Concrete network backends live outside this crate. [`ChannelTransport`]
//! is an in-memory implementation over tokio channels, used to bridge a
//! backend task (or a test peer) to a connection, and [`pump_events`] drives
//! a listener from any [`TransportReceiver`].

pub mod channel;
pub mod error;
pub mod pump;
pub mod traits;

pub use channel::{ChannelPeer, ChannelReceiver, ChannelTransport};
pub use error::{Result, TransportError};
pub use pump::pump_events;
pub use traits::{Transport, TransportConfig, TransportEvent, TransportListener, TransportReceiver};

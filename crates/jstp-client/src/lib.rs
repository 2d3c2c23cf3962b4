//! JSTP Client Library
//!
//! Connection state machine for JSTP over any [`jstp_transport::Transport`]:
//! handshake, outbound queue, and pluggable session and restoration
//! policies that decide what survives a dropped transport.
//!
//! # Example
//!
//! ```ignore
//! use jstp_client::prelude::*;
//!
//! let conn = ConnectionBuilder::new(transport)
//!     .app_name("inventory")
//!     .restoration_policy(SessionRestorationPolicy::new())
//!     .connect()?;
//!
//! // queued until the server acknowledges the handshake
//! conn.send(Object::new().with("call", vec![1]))?;
//!
//! tokio::spawn(pump_events(events, conn.clone()));
//! ```

pub mod builder;
pub mod connection;
pub mod error;
pub mod policy;

pub use builder::ConnectionBuilder;
pub use connection::{Connection, ConnectionHandle, ConnectionListener, ConnectionState};
pub use error::{ClientError, Result};
pub use policy::{
    DropRestorationPolicy, RestorationPolicy, SessionData, SessionPolicy,
    SessionRestorationPolicy, SimpleSessionPolicy,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::ConnectionBuilder;
    pub use crate::connection::{Connection, ConnectionListener, ConnectionState};
    pub use crate::error::{ClientError, Result};
    pub use crate::policy::{DropRestorationPolicy, SessionRestorationPolicy};
    pub use jstp_core::{Object, Value};
    pub use jstp_transport::pump_events;
}

//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("connection closed")]
    Closed,

    #[error("no transport attached")]
    NoTransport,

    #[error("application name not set")]
    MissingAppName,

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] jstp_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] jstp_transport::TransportError),
}

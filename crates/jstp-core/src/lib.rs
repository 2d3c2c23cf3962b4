//! JSTP Core
//!
//! Value model, text codec and packet framing for JSTP, a JSON-superset
//! protocol that exchanges NUL-terminated object packets over a byte stream.
//!
//! This crate provides:
//! - The wire value model ([`Value`], [`Number`], [`Object`])
//! - Tokenizer and recursive-descent parser ([`token`], [`Parser`])
//! - Serialization through [`std::fmt::Display`] ([`serializer`])
//! - Incremental packet extraction from a receive buffer ([`frame`])

pub mod error;
pub mod frame;
pub mod parser;
pub mod serializer;
pub mod token;
pub mod value;

pub use error::{Error, Result};
pub use frame::{encode_packet, parse_packets, PacketBuffer, TERMINATOR};
pub use parser::{parse, parse_object, validate, Parser, MAX_DEPTH};
pub use serializer::Quote;
pub use token::{Token, Tokenizer};
pub use value::{Number, Object, Value};

/// Key carrying the application name in a handshake packet
pub const HANDSHAKE_KEY: &str = "handshake";

/// Key carrying the session id to resume in a handshake packet
pub const SESSION_KEY: &str = "session";

/// Key carrying the session id in a successful handshake reply
pub const OK_KEY: &str = "ok";

/// Key carrying the failure reason in a rejected handshake reply
pub const ERROR_KEY: &str = "error";

//! Error types for JSTP core

use thiserror::Error;

/// Result type alias for JSTP codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// JSTP codec error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A token appeared where something else was required
    #[error("unexpected token at offset {offset}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        offset: usize,
    },

    /// Input ended before the value was complete
    #[error("unexpected end of input: expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    /// String literal without a closing quote
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    /// Malformed escape sequence inside a string
    #[error("invalid escape at offset {offset}: {reason}")]
    InvalidEscape { offset: usize, reason: String },

    /// Number token that cannot be converted
    #[error("invalid number literal: {0}")]
    InvalidNumber(String),

    /// Two separators inside one key-value pair (`{a : b : 1}`)
    #[error("duplicate separator in key-value pair at offset {0}")]
    DuplicateSeparator(usize),

    /// Arrays and objects nested past the parser's limit
    #[error("nesting deeper than {depth} levels")]
    NestingTooDeep { depth: usize },

    /// Top-level value was not an object where a packet was required
    #[error("expected object, found {0}")]
    ExpectedObject(&'static str),

    /// A complete NUL-terminated chunk failed to parse
    #[error("malformed packet #{index}: {source}")]
    Framing {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// Packet bytes were not valid UTF-8
    #[error("packet is not valid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

impl Error {
    /// True for lexical/structural errors raised by the parser itself
    pub fn is_parse_error(&self) -> bool {
        !matches!(self, Error::Framing { .. } | Error::InvalidUtf8(_))
    }

    /// True for errors raised while splitting a byte stream into packets
    pub fn is_framing_error(&self) -> bool {
        matches!(self, Error::Framing { .. } | Error::InvalidUtf8(_))
    }
}

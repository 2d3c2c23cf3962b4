//! Packet framing
//!
//! JSTP packet stream format:
//! ```text
//! ┌──────────────────────────────┬──────┬──────────────────────────────┬──────┐
//! │ packet text (object, UTF-8)  │ 0x00 │ packet text (object, UTF-8)  │ 0x00 │ ...
//! └──────────────────────────────┴──────┴──────────────────────────────┴──────┘
//! ```
//! There is no length prefix: a packet ends at the first NUL byte. Bytes after
//! the last NUL are an incomplete packet and stay buffered until more data
//! arrives.

use bytes::BytesMut;

use crate::parser::Parser;
use crate::value::Object;
use crate::{Error, Result};

/// Packet terminator byte
pub const TERMINATOR: u8 = 0x00;

fn framing_error(index: usize, source: Error) -> Error {
    Error::Framing {
        index,
        source: Box::new(source),
    }
}

/// Extract every complete packet from `buf[..*len]`
///
/// On success the unterminated tail is moved to the front of `buf` and `*len`
/// is set to its length (zero when the data ended on a terminator). On error
/// neither `buf` nor `*len` is touched and no packets are returned.
pub fn parse_packets(buf: &mut [u8], len: &mut usize) -> Result<Vec<Object>> {
    let valid = (*len).min(buf.len());
    let mut packets = Vec::new();
    let mut chunk_start = 0;

    {
        let data = &buf[..valid];
        let mut parser = Parser::default();
        while let Some(chunk_len) = data[chunk_start..].iter().position(|&b| b == TERMINATOR) {
            let index = packets.len();
            let chunk = &data[chunk_start..chunk_start + chunk_len];
            let text = std::str::from_utf8(chunk).map_err(|e| framing_error(index, e.into()))?;

            parser.set_input(text);
            let packet = parser
                .parse_object()
                .and_then(|packet| parser.finish().map(|_| packet))
                .map_err(|e| framing_error(index, e))?;
            packets.push(packet);

            chunk_start += chunk_len + 1;
        }
    }

    let rest = valid - chunk_start;
    if rest > 0 && chunk_start > 0 {
        buf.copy_within(chunk_start..valid, 0);
    }
    *len = rest;
    Ok(packets)
}

/// Serialize a packet and append the terminator
pub fn encode_packet(packet: &Object) -> String {
    let mut text = packet.to_string();
    text.push(TERMINATOR as char);
    text
}

/// Growable receive buffer that yields complete packets
#[derive(Debug, Default)]
pub struct PacketBuffer {
    buf: BytesMut,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append freshly received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Take all complete packets, keeping any partial tail
    pub fn drain_packets(&mut self) -> Result<Vec<Object>> {
        let mut len = self.buf.len();
        let packets = parse_packets(&mut self.buf[..], &mut len)?;
        self.buf.truncate(len);
        Ok(packets)
    }

    /// Number of buffered bytes not yet part of a complete packet
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

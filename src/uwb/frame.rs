//! # UWB Packet Framer
//!
//! The serial line carries framed packets with no framing beyond a two-byte
//! magic prefix `DC AC`, a little-endian u16 payload length, and the payload.
//! This module extracts payloads from the raw byte stream and resynchronises
//! on the magic when the stream is mid-packet at startup or after corruption.
//!
//! The framer is push-based: bytes go in as they arrive from the port, whole
//! payloads come out. Splitting the stream at arbitrary octet boundaries does
//! not change the sequence of payloads produced.

use crate::constants::PACKET_MAGIC;
use crate::util::StreamBuffer;
use log::debug;

/// Fixed header size: two magic bytes plus the little-endian length.
const HEADER_LEN: usize = 4;

/// Streaming packet framer for the UWB serial protocol.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: StreamBuffer,
    resync_count: u64,
    frame_count: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the serial port.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.push(bytes);
    }

    /// Extract the next complete payload, if one is buffered.
    ///
    /// While the buffer does not start with the magic, leading octets are
    /// discarded one at a time; the framer never waits on more than one octet
    /// to decide whether to discard. Returns `None` when more bytes are
    /// needed to complete a header or payload.
    pub fn next_payload(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.buf.is_empty() {
                return None;
            }
            if self.buf.get(0) != Some(PACKET_MAGIC[0]) {
                self.thrash();
                continue;
            }
            if self.buf.len() < 2 {
                return None;
            }
            if self.buf.get(1) != Some(PACKET_MAGIC[1]) {
                self.thrash();
                continue;
            }
            if self.buf.len() < HEADER_LEN {
                return None;
            }
            let header = self.buf.peek(HEADER_LEN);
            let length = u16::from_le_bytes([header[2], header[3]]) as usize;
            if self.buf.len() < HEADER_LEN + length {
                return None;
            }
            self.buf.consume(HEADER_LEN);
            self.frame_count += 1;
            let payload = self.buf.consume(length);
            debug!("Frame payload ({} bytes): {}", payload.len(), hex::encode(&payload));
            return Some(payload);
        }
    }

    fn thrash(&mut self) {
        if let Some(byte) = self.buf.skip_one() {
            self.resync_count += 1;
            debug!(
                "Realigning: thrash 0x{:02X}: {}",
                byte,
                if (32..=126).contains(&byte) {
                    byte as char
                } else {
                    '?'
                }
            );
        }
    }

    /// Discard all buffered bytes (used after a device reset).
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Octets discarded while hunting for the magic.
    pub fn resync_count(&self) -> u64 {
        self.resync_count
    }

    /// Complete frames extracted so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

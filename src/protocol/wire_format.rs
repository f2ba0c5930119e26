//! Wire format constants and header encoding/decoding.
//!
//! Implements the 16-byte message header:
//! ```text
//! ┌───────────────┬────────────┬────────────┬───────────┐
//! │ messageLength │ requestID  │ responseTo │ opCode    │
//! │ 4 bytes       │ 4 bytes    │ 4 bytes    │ 4 bytes   │
//! │ int32 LE      │ int32 LE   │ int32 LE   │ uint32 LE │
//! └───────────────┴────────────┴────────────┴───────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. `messageLength` covers the
//! entire message including the header itself.

use crate::error::{DocwireError, Result};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// The only operation code this client speaks (OP_MSG).
pub const OP_MSG: u32 = 2013;

/// Smallest legal message: header plus the 4-byte flag field.
pub const MIN_MESSAGE_SIZE: u32 = (HEADER_SIZE + 4) as u32;

/// Default maximum message size accepted from the server (48 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 48 * 1024 * 1024;

/// Flag bit constants for the message flags field.
pub mod flags {
    /// A CRC-32C checksum trails the message.
    pub const CHECKSUM_PRESENT: u32 = 1 << 0;
    /// Another message follows without awaiting a reply.
    pub const MORE_TO_COME: u32 = 1 << 1;
    /// The sender permits a MORE_TO_COME reply stream.
    pub const EXHAUST_ALLOWED: u32 = 1 << 16;

    /// Bits 0-15 must be understood by the receiver; bits 16-31 are
    /// optional and may be ignored.
    pub const REQUIRED_MASK: u32 = 0x0000_FFFF;

    /// Required bits this client understands.
    pub const KNOWN_REQUIRED: u32 = CHECKSUM_PRESENT | MORE_TO_COME;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(bits: u32, flag: u32) -> bool {
        bits & flag != 0
    }

    /// Required bits set that this client does not understand.
    #[inline]
    pub fn unknown_required(bits: u32) -> u32 {
        bits & REQUIRED_MASK & !KNOWN_REQUIRED
    }
}

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Total message length in bytes, header included.
    pub message_length: i32,
    /// Identifier chosen by the sender of a request.
    pub request_id: i32,
    /// Request id this message answers; 0 on requests.
    pub response_to: i32,
    /// Operation code; always [`OP_MSG`] in this client.
    pub op_code: u32,
}

impl MsgHeader {
    pub fn new(message_length: i32, request_id: i32, response_to: i32, op_code: u32) -> Self {
        Self {
            message_length,
            request_id,
            response_to,
            op_code,
        }
    }

    /// Encode the header to bytes (Little Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.message_length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.request_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.response_to.to_le_bytes());
        buf[12..16].copy_from_slice(&self.op_code.to_le_bytes());
        buf
    }

    /// Decode a header from bytes.
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            message_length: i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            request_id: i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            response_to: i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            op_code: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Validate the operation code and length bounds.
    pub fn validate(&self, max_message_size: u32) -> Result<()> {
        if self.op_code != OP_MSG {
            return Err(DocwireError::Protocol(format!(
                "unexpected operation code {} (expected {})",
                self.op_code, OP_MSG
            )));
        }
        if self.message_length < MIN_MESSAGE_SIZE as i32 {
            return Err(DocwireError::Protocol(format!(
                "message length {} is below the minimum of {}",
                self.message_length, MIN_MESSAGE_SIZE
            )));
        }
        if self.message_length as i64 > i64::from(max_message_size) {
            return Err(DocwireError::Protocol(format!(
                "message length {} exceeds maximum {}",
                self.message_length, max_message_size
            )));
        }
        Ok(())
    }
}

/// CRC-32C (Castagnoli) checksum over message bytes.
#[inline]
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32c::crc32c(bytes)
}

//! Protocol module - wire format, message framing, and reassembly.
//!
//! This module implements the binary message layer:
//! - 16-byte header encoding/decoding and wire constants
//! - Message building and parsing (sections, flags, checksum)
//! - Reassembly buffer for partial reads

mod message;
mod message_buffer;
mod wire_format;

pub use message::{build_message, build_reply, parse_message, Section, WireMessage};
pub use message_buffer::MessageBuffer;
pub use wire_format::{
    checksum, flags, MsgHeader, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE, MIN_MESSAGE_SIZE, OP_MSG,
};

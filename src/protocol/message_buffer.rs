//! Reassembly buffer for partial reads.
//!
//! The transport may deliver a message in arbitrarily small chunks. This
//! buffer accumulates raw reads in a `bytes::BytesMut` and yields complete
//! frames once the declared total length is available, using a two-state
//! machine:
//! - `WaitingForHeader`: need at least 16 bytes
//! - `WaitingForBody`: header seen, need the declared total length

use bytes::{Bytes, BytesMut};

use crate::error::Result;

use super::wire_format::{MsgHeader, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE};

/// Parsing state.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete header.
    WaitingForHeader,
    /// Header validated; waiting until `total` bytes are buffered.
    WaitingForBody { total: usize },
}

/// Buffer accumulating incoming bytes and extracting complete frames.
///
/// Frames are returned as whole messages (header included) ready for
/// [`parse_message`](super::parse_message).
pub struct MessageBuffer {
    buffer: BytesMut,
    state: State,
    max_message_size: u32,
}

impl MessageBuffer {
    /// Create a buffer with the default maximum message size.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns an empty vector while a frame is still incomplete; partial
    /// data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if a header fails validation (wrong operation
    /// code, length out of bounds).
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        match self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return Ok(None);
                }
                let header = MsgHeader::decode(&self.buffer[..HEADER_SIZE])
                    .expect("buffer has enough bytes");
                header.validate(self.max_message_size)?;

                self.state = State::WaitingForBody {
                    total: header.message_length as usize,
                };
                self.try_extract_one()
            }
            State::WaitingForBody { total } => {
                if self.buffer.len() < total {
                    return Ok(None);
                }
                let frame = self.buffer.split_to(total).freeze();
                self.state = State::WaitingForHeader;
                Ok(Some(frame))
            }
        }
    }

    /// Buffered byte count, complete or not.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when no partial frame is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered bytes and reset the state machine.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

//! Error types for docwire-client.

use thiserror::Error;

/// Main error type for all docwire operations.
#[derive(Debug, Error)]
pub enum DocwireError {
    /// Transport failure: connect, read, or write.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Frame-level protocol violation (bad operation code, unknown required
    /// flag bits, checksum mismatch, section framing).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Document-level corruption (length mismatch, bad type tag, missing
    /// terminator).
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// A reply arrived whose responseTo does not match the outstanding
    /// request. `expected` is 0 when no request was outstanding at all.
    #[error("unexpected reply: responseTo {got} does not match outstanding request {expected}")]
    UnexpectedReply { expected: i32, got: i32 },

    /// A second request was issued before the first reply arrived.
    #[error("a request is already outstanding on this connection")]
    ConcurrentRequest,

    /// The server reported a failure inside a well-formed reply.
    #[error("command failed with code {code}: {message}")]
    Command { code: i32, message: String },

    /// The stream ended mid-frame, or the connection is not open.
    #[error("connection closed")]
    ConnectionClosed,
}

impl DocwireError {
    /// Whether this error leaves the connection unusable.
    ///
    /// `MalformedDocument` is not fatal to the connection: the framer
    /// consumed exactly the declared frame length, so the corrupt bytes are
    /// isolated and the stream stays in sync. `ConcurrentRequest` and
    /// `Command` are caller-level outcomes.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DocwireError::Transport(_)
                | DocwireError::Protocol(_)
                | DocwireError::UnexpectedReply { .. }
                | DocwireError::ConnectionClosed
        )
    }
}

/// Result type alias using DocwireError.
pub type Result<T> = std::result::Result<T, DocwireError>;

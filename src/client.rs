//! Connection facade: request execution and lifecycle.
//!
//! A [`Connection`] owns one transport stream and runs one request at a
//! time:
//! 1. Allocate and register a request id
//! 2. Build the frame and write it to the transport
//! 3. Read until the declared reply length is buffered (the sole
//!    suspension point)
//! 4. Parse, correlate, and extract the reply body
//!
//! Callers may wrap a call in `tokio::time::timeout`; after a cancelled
//! call the stream is desynchronized and the connection should be closed.
//!
//! # Example
//!
//! ```ignore
//! use docwire_client::{doc, Connection, Section};
//!
//! let conn = Connection::connect("127.0.0.1", 27017).await?;
//! let reply = conn
//!     .execute_op_msg(&[Section::Body(doc! {
//!         "count" => "profiles",
//!         "$db" => "juanportal",
//!     })])
//!     .await?;
//! assert_eq!(reply.get_number("ok"), Some(1.0));
//! conn.close().await;
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::codec::Document;
use crate::correlate::RequestCorrelator;
use crate::error::{DocwireError, Result};
use crate::protocol::{
    build_message, parse_message, MessageBuffer, Section, WireMessage, DEFAULT_MAX_MESSAGE_SIZE,
};
use crate::transport;

/// Default read chunk size for the reply loop.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport connect in progress.
    Connecting = 0,
    /// Ready to execute requests.
    Open = 1,
    /// A fatal error or `close()` is tearing the connection down.
    Closing = 2,
    /// The transport has been released.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum reply size accepted from the server.
    pub max_message_size: u32,
    /// Read chunk size for the reply loop.
    pub read_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Per-request state; serialized behind the connection mutex.
struct Core<S> {
    stream: S,
    buffer: MessageBuffer,
    correlator: RequestCorrelator,
    read_buffer_size: usize,
}

/// A connection to a document-database server.
///
/// Single-request-at-a-time: a second `execute_op_msg` while one is in
/// flight fails with `ConcurrentRequest`. Run parallel queries over
/// independent connections; nothing is shared between them.
pub struct Connection<S = TcpStream> {
    core: Mutex<Option<Core<S>>>,
    state: AtomicU8,
}

impl Connection<TcpStream> {
    /// Connect to `host:port` over TCP.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_config(host, port, ConnectionConfig::default()).await
    }

    pub async fn connect_with_config(
        host: &str,
        port: u16,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let stream = transport::connect(host, port).await?;
        Ok(Self::with_config(stream, config))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Adopt an already-connected stream. The connection starts Open.
    pub fn from_stream(stream: S) -> Self {
        Self::with_config(stream, ConnectionConfig::default())
    }

    pub fn with_config(stream: S, config: ConnectionConfig) -> Self {
        Self {
            core: Mutex::new(Some(Core {
                stream,
                buffer: MessageBuffer::with_max_message_size(config.max_message_size),
                correlator: RequestCorrelator::new(),
                read_buffer_size: config.read_buffer_size,
            })),
            state: AtomicU8::new(ConnectionState::Open as u8),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Execute a command with no flag bits set and return the reply body.
    pub async fn execute_op_msg(&self, sections: &[Section]) -> Result<Document> {
        self.execute_op_msg_with_flags(sections, 0).await
    }

    /// Execute a command and return the reply body.
    ///
    /// Valid only while the connection is Open. A reply whose `ok` field is
    /// numeric zero becomes [`Command`](DocwireError::Command). Fatal
    /// errors move the connection to Closed and release the transport
    /// before the error is returned.
    pub async fn execute_op_msg_with_flags(
        &self,
        sections: &[Section],
        flag_bits: u32,
    ) -> Result<Document> {
        if self.state() != ConnectionState::Open {
            return Err(DocwireError::ConnectionClosed);
        }
        let mut guard = self
            .core
            .try_lock()
            .map_err(|_| DocwireError::ConcurrentRequest)?;
        let core = guard.as_mut().ok_or(DocwireError::ConnectionClosed)?;

        match round_trip(core, sections, flag_bits).await {
            Ok(doc) => Ok(doc),
            Err(err) if err.is_fatal() => {
                tracing::debug!("fatal error, tearing down connection: {}", err);
                self.state
                    .store(ConnectionState::Closing as u8, Ordering::Release);
                if let Some(mut core) = guard.take() {
                    let _ = core.stream.shutdown().await;
                }
                self.state
                    .store(ConnectionState::Closed as u8, Ordering::Release);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Close the connection and release the transport.
    ///
    /// Valid in any state and idempotent: the stream is shut down at most
    /// once, and later calls are no-ops.
    pub async fn close(&self) {
        self.state
            .store(ConnectionState::Closing as u8, Ordering::Release);
        let mut guard = self.core.lock().await;
        if let Some(mut core) = guard.take() {
            if let Err(err) = core.stream.shutdown().await {
                tracing::debug!("error shutting down transport: {}", err);
            }
        }
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }
}

/// One request/reply exchange. Fatal classification happens in the caller;
/// this keeps the correlator slot consistent on every path.
async fn round_trip<S>(core: &mut Core<S>, sections: &[Section], flag_bits: u32) -> Result<Document>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request_id = core.correlator.next_request_id();
    core.correlator.register(request_id)?;

    let result = exchange(core, sections, flag_bits, request_id).await;
    if result.is_err() {
        core.correlator.abandon();
    }
    result
}

async fn exchange<S>(
    core: &mut Core<S>,
    sections: &[Section],
    flag_bits: u32,
    request_id: i32,
) -> Result<Document>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = build_message(flag_bits, sections, request_id)?;
    tracing::trace!(request_id, bytes = request.len(), "sending request");
    core.stream.write_all(&request).await?;
    core.stream.flush().await?;

    let frame = read_frame(core).await?;
    let reply = parse_message(&frame)?;
    core.correlator.resolve(reply.header.response_to)?;
    tracing::trace!(
        request_id,
        bytes = frame.len(),
        sections = reply.sections.len(),
        "received reply"
    );
    reply_document(reply)
}

/// Read until one complete frame is buffered.
///
/// The transport may deliver the reply in arbitrarily small chunks; the
/// [`MessageBuffer`] reassembles them. A clean stream end mid-frame is
/// `ConnectionClosed`; any data beyond the single expected reply means the
/// stream is desynchronized.
async fn read_frame<S>(core: &mut Core<S>) -> Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; core.read_buffer_size];
    loop {
        let n = core.stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(DocwireError::ConnectionClosed);
        }
        let mut frames = core.buffer.push(&chunk[..n])?;
        if frames.is_empty() {
            continue;
        }
        let frame = frames.remove(0);
        if !frames.is_empty() || !core.buffer.is_empty() {
            return Err(DocwireError::Protocol(
                "received data beyond the outstanding reply".to_string(),
            ));
        }
        return Ok(frame);
    }
}

/// Extract the reply body and surface server-reported failures.
fn reply_document(reply: WireMessage) -> Result<Document> {
    let mut body = None;
    for section in reply.sections {
        if let Section::Body(doc) = section {
            if body.is_none() {
                body = Some(doc);
            }
        }
    }
    let doc = body
        .ok_or_else(|| DocwireError::Protocol("reply has no body section".to_string()))?;

    if let Some(ok) = doc.get_number("ok") {
        if ok == 0.0 {
            let code = doc.get_i32("code").unwrap_or(0);
            let message = doc.get_str("errmsg").unwrap_or_default().to_string();
            return Err(DocwireError::Command { code, message });
        }
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::protocol::build_reply;
    use tokio::io::duplex;

    #[test]
    fn test_connection_state_from_u8() {
        assert_eq!(ConnectionState::from_u8(0), ConnectionState::Connecting);
        assert_eq!(ConnectionState::from_u8(1), ConnectionState::Open);
        assert_eq!(ConnectionState::from_u8(2), ConnectionState::Closing);
        assert_eq!(ConnectionState::from_u8(3), ConnectionState::Closed);
    }

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_reply_document_extracts_body() {
        let reply = parse_message(
            &build_reply(0, &[Section::Body(doc! { "n" => 5i32, "ok" => 1.0 })], 2, 1).unwrap(),
        )
        .unwrap();

        let doc = reply_document(reply).unwrap();
        assert_eq!(doc.get_i32("n"), Some(5));
    }

    #[test]
    fn test_reply_document_surfaces_command_error() {
        let reply = parse_message(
            &build_reply(
                0,
                &[Section::Body(doc! {
                    "ok" => 0.0,
                    "errmsg" => "no such command",
                    "code" => 59i32,
                })],
                2,
                1,
            )
            .unwrap(),
        )
        .unwrap();

        let err = reply_document(reply).unwrap_err();
        assert!(matches!(
            err,
            DocwireError::Command { code: 59, ref message } if message == "no such command"
        ));
    }

    #[test]
    fn test_reply_document_accepts_int_ok() {
        // Some servers send `ok` as an int rather than a double.
        let reply = parse_message(
            &build_reply(0, &[Section::Body(doc! { "ok" => 1i32 })], 2, 1).unwrap(),
        )
        .unwrap();
        assert!(reply_document(reply).is_ok());
    }

    #[test]
    fn test_reply_document_requires_body() {
        let reply = parse_message(
            &build_reply(
                0,
                &[Section::DocumentSequence {
                    identifier: "documents".to_string(),
                    documents: vec![doc! { "x" => 1i32 }],
                }],
                2,
                1,
            )
            .unwrap(),
        )
        .unwrap();

        let err = reply_document(reply).unwrap_err();
        assert!(err.to_string().contains("no body section"));
    }

    #[tokio::test]
    async fn test_execute_against_scripted_server() {
        let (client_io, mut server_io) = duplex(4096);
        let conn = Connection::from_stream(client_io);

        let server = tokio::spawn(async move {
            let mut buffer = MessageBuffer::new();
            let mut chunk = [0u8; 1024];
            let request = loop {
                let n = server_io.read(&mut chunk).await.unwrap();
                assert!(n > 0);
                let frames = buffer.push(&chunk[..n]).unwrap();
                if let Some(frame) = frames.into_iter().next() {
                    break parse_message(&frame).unwrap();
                }
            };
            let reply = build_reply(
                0,
                &[Section::Body(doc! { "n" => 5i32, "ok" => 1.0 })],
                100,
                request.header.request_id,
            )
            .unwrap();
            server_io.write_all(&reply).await.unwrap();
        });

        let doc = conn
            .execute_op_msg(&[Section::Body(doc! { "count" => "profiles" })])
            .await
            .unwrap();
        assert_eq!(doc.get_i32("n"), Some(5));
        assert_eq!(conn.state(), ConnectionState::Open);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_after_close_fails() {
        let (client_io, _server_io) = duplex(64);
        let conn = Connection::from_stream(client_io);

        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);

        let err = conn
            .execute_op_msg(&[Section::Body(doc! { "ping" => 1i32 })])
            .await
            .unwrap_err();
        assert!(matches!(err, DocwireError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client_io, _server_io) = duplex(64);
        let conn = Connection::from_stream(client_io);

        conn.close().await;
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_unexpected_reply_is_fatal() {
        let (client_io, mut server_io) = duplex(4096);
        let conn = Connection::from_stream(client_io);

        let server = tokio::spawn(async move {
            let mut buffer = MessageBuffer::new();
            let mut chunk = [0u8; 1024];
            let request = loop {
                let n = server_io.read(&mut chunk).await.unwrap();
                let frames = buffer.push(&chunk[..n]).unwrap();
                if let Some(frame) = frames.into_iter().next() {
                    break parse_message(&frame).unwrap();
                }
            };
            // Answer with a responseTo that matches nothing.
            let reply = build_reply(
                0,
                &[Section::Body(doc! { "ok" => 1.0 })],
                100,
                request.header.request_id + 7,
            )
            .unwrap();
            server_io.write_all(&reply).await.unwrap();
        });

        let err = conn
            .execute_op_msg(&[Section::Body(doc! { "ping" => 1i32 })])
            .await
            .unwrap_err();
        assert!(matches!(err, DocwireError::UnexpectedReply { .. }));
        assert_eq!(conn.state(), ConnectionState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_end_mid_frame_is_connection_closed() {
        let (client_io, mut server_io) = duplex(4096);
        let conn = Connection::from_stream(client_io);

        let server = tokio::spawn(async move {
            let mut chunk = [0u8; 1024];
            let _ = server_io.read(&mut chunk).await.unwrap();
            let reply = build_reply(0, &[Section::Body(doc! { "ok" => 1.0 })], 100, 1).unwrap();
            // Half a frame, then drop the stream.
            server_io.write_all(&reply[..reply.len() / 2]).await.unwrap();
        });

        let err = conn
            .execute_op_msg(&[Section::Body(doc! { "ping" => 1i32 })])
            .await
            .unwrap_err();
        assert!(matches!(err, DocwireError::ConnectionClosed));
        assert_eq!(conn.state(), ConnectionState::Closed);
        server.await.unwrap();
    }
}

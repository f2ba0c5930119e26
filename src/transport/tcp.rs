//! TCP connect.

use tokio::net::TcpStream;

use crate::error::Result;

/// Open a TCP stream to `host:port` with `TCP_NODELAY` set.
///
/// Any underlying failure surfaces as
/// [`Transport`](crate::error::DocwireError::Transport).
pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    tracing::debug!("connected to {}:{}", host, port);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocwireError;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect("127.0.0.1", port).await.unwrap();
        assert!(stream.peer_addr().is_ok());
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        // Bind then drop to get a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, DocwireError::Transport(_)));
    }
}

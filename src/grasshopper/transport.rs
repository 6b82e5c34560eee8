//! TCP transport to the Grasshopper component.
//!
//! One connection per exchange, no pooling:
//!
//! - the request is written as a single line terminated by `\n`
//! - the response is read until a chunk ends with `\n` or the peer closes
//! - connect, write and read are each bounded by the configured wait time
//!
//! The socket is owned by the exchange future and is closed when it returns,
//! whatever the outcome.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::grasshopper::error::HostError;

/// Read buffer size per `recv`.
const CHUNK_SIZE: usize = 4096;

/// Default wait time for connect and response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A newline-delimited request/response transport over TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// `host:port` to dial.
    address: String,
    /// Wait time for each phase of an exchange.
    timeout: Duration,
}

impl TcpTransport {
    /// Creates a transport for `host:port`.
    pub fn new(host: impl AsRef<str>, port: u16, timeout: Duration) -> Self {
        Self {
            address: format!("{}:{port}", host.as_ref()),
            timeout,
        }
    }

    /// Returns the dialled address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the wait time applied to each phase.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends one payload and returns the raw response line, terminator included.
    ///
    /// # Errors
    ///
    /// - [`HostError::Connect`] if the connection is refused
    /// - [`HostError::Timeout`] if any phase exceeds the wait time
    /// - [`HostError::ConnectionClosed`] if the peer closes before sending anything
    /// - [`HostError::IncompleteResponse`] if the peer closes mid-line
    /// - [`HostError::Io`] for any other socket failure
    pub async fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>, HostError> {
        let mut stream = timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| HostError::timeout("connecting to", self.timeout))?
            .map_err(|source| HostError::Connect {
                address: self.address.clone(),
                source,
            })?;

        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(b'\n');

        timeout(self.timeout, stream.write_all(&line))
            .await
            .map_err(|_| HostError::timeout("sending to", self.timeout))?
            .map_err(|source| HostError::Io { source })?;

        let response = timeout(self.timeout, read_line(&mut stream))
            .await
            .map_err(|_| HostError::timeout("waiting for response from", self.timeout))??;

        Ok(response)
    }
}

/// Accumulates chunks until the buffer ends with a newline or the peer closes.
async fn read_line(stream: &mut TcpStream) -> Result<Vec<u8>, HostError> {
    let mut response = Vec::new();
    let mut chunk = [0_u8; CHUNK_SIZE];

    loop {
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|source| HostError::Io { source })?;

        if read == 0 {
            if response.is_empty() {
                return Err(HostError::ConnectionClosed);
            }
            break;
        }

        response.extend_from_slice(&chunk[..read]);
        if response.ends_with(b"\n") {
            return Ok(response);
        }
    }

    Err(HostError::IncompleteResponse {
        received: response.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn transport(port: u16, millis: u64) -> TcpTransport {
        TcpTransport::new("127.0.0.1", port, Duration::from_millis(millis))
    }

    #[tokio::test]
    async fn exchange_appends_newline_and_reads_reply() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = tokio::io::BufReader::new(socket);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            reader
                .get_mut()
                .write_all(b"{\"success\":true}\n")
                .await
                .unwrap();
            line
        });

        let reply = transport(port, 2000).exchange(b"{\"ping\":1}").await.unwrap();
        assert_eq!(reply, b"{\"success\":true}\n");
        assert_eq!(server.await.unwrap(), "{\"ping\":1}\n");
    }

    #[tokio::test]
    async fn reply_split_across_chunks() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"{\"success\":").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            socket.write_all(b"true}\n").await.unwrap();
            // keep the socket open until the client hangs up
            let mut sink = [0_u8; 64];
            let _ = socket.read(&mut sink).await;
        });

        let reply = transport(port, 2000).exchange(b"{}").await.unwrap();
        assert_eq!(reply, b"{\"success\":true}\n");
    }

    #[tokio::test]
    async fn missing_terminator_times_out() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"{\"success\":true}").await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let err = transport(port, 200).exchange(b"{}").await.unwrap_err();
        assert!(
            matches!(err, HostError::Timeout { phase, .. } if phase == "waiting for response from"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn close_without_bytes_is_connection_failure() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let err = transport(port, 2000).exchange(b"{}").await.unwrap_err();
        assert!(
            matches!(err, HostError::ConnectionClosed | HostError::Io { .. }),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn close_mid_line_is_incomplete() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 64];
            let _ = socket.read(&mut buf).await;
            socket.write_all(b"{\"success\":tr").await.unwrap();
        });

        let err = transport(port, 2000).exchange(b"{}").await.unwrap_err();
        assert!(
            matches!(err, HostError::IncompleteResponse { received: 13 }),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let (listener, port) = listener().await;
        drop(listener);

        let err = transport(port, 2000).exchange(b"{}").await.unwrap_err();
        assert!(err.is_transport());
        assert!(
            matches!(err, HostError::Connect { .. } | HostError::Timeout { .. }),
            "unexpected error: {err}"
        );
    }
}

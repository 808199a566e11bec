//! The byte-stream transport the session engine reads frames from and writes
//! frames to.
//!
//! Serial port opening and device enumeration are out of scope here — a
//! caller supplies any [`Transport`] impl, including one backed by a serial
//! port crate. This crate ships the two transports every embedder needs out
//! of the box: [`TcpTransport`] for the common `tcp:host:port` case, and an
//! in-memory duplex pair for tests that should not depend on real sockets or
//! real time.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Errors surfaced by a [`Transport`] beyond what the reader/writer traits
/// themselves report — currently just a thin wrapper so callers have a
/// single error type to match on regardless of the underlying transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport io error: {0}")]
    Io(#[from] io::Error),
    #[error("transport connect failed: {0}")]
    Connect(io::Error),
}

/// A duplex byte stream the session engine can read frames from and write
/// frames to. Any `AsyncRead + AsyncWrite + Unpin + Send` type qualifies —
/// this is a marker trait, not a new interface, so wrapping an existing
/// stream (a `TcpStream`, a serial port, an in-memory duplex half) costs
/// nothing.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// A TCP-backed transport, the common case for talking to `asebaswitch` or a
/// simulator listening on a TCP port.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::Connect)?;
        stream.set_nodelay(true).map_err(TransportError::Io)?;
        tracing::debug!(addr, "tcp transport connected");
        Ok(TcpTransport { stream })
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        TcpTransport { stream }
    }
}

impl AsyncRead for TcpTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// Build an in-memory, in-process pair of transports that talk to each
/// other, for driving a [`Transport`] consumer against a synthetic peer
/// without a real socket. `buffer` bounds how many unread bytes either side
/// may hold before the writer backpressures.
pub fn test_transport_pair(buffer: usize) -> (tokio::io::DuplexStream, tokio::io::DuplexStream) {
    tokio::io::duplex(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn duplex_pair_round_trips_bytes() {
        let (mut a, mut b) = test_transport_pair(64);
        a.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn duplex_pair_is_bidirectional() {
        let (mut a, mut b) = test_transport_pair(64);
        b.write_all(b"pong").await.unwrap();
        let mut buf = [0u8; 4];
        a.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}

//! The plain-or-TLS stream returned to callers.

use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

/// A connected byte stream, either raw TCP or TLS-upgraded.
///
/// For a TLS stream, `standard_compatible` controls shutdown: when true,
/// shutdown performs the TLS close_notify exchange before closing the
/// transport; when false, the transport is shut down directly. Some
/// protocols, such as HTTP, need the latter.
#[derive(Debug)]
pub enum SocketStream {
    Tcp(TcpStream),
    Tls {
        stream: Box<SslStream<TcpStream>>,
        standard_compatible: bool,
    },
}

impl SocketStream {
    /// Remote address of the underlying transport.
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match self {
            SocketStream::Tcp(stream) => stream.peer_addr(),
            SocketStream::Tls { stream, .. } => stream.get_ref().peer_addr(),
        }
    }

    /// Returns true if the stream was TLS-upgraded.
    pub fn is_tls(&self) -> bool {
        matches!(self, SocketStream::Tls { .. })
    }
}

impl AsyncRead for SocketStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            SocketStream::Tls { stream, .. } => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SocketStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            SocketStream::Tls { stream, .. } => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            SocketStream::Tls { stream, .. } => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            SocketStream::Tls {
                stream,
                standard_compatible,
            } => {
                if *standard_compatible {
                    Pin::new(stream.as_mut()).poll_shutdown(cx)
                } else {
                    // Skip close_notify; shut the transport down directly.
                    Pin::new(stream.get_mut()).poll_shutdown(cx)
                }
            }
        }
    }
}

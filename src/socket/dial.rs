//! The dial capability and its TCP implementation.

use crate::base::error::Error;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::{TcpSocket, TcpStream};

/// Alias for the `Future` type returned by a dialer.
pub type Dialing<S> = Pin<Box<dyn Future<Output = Result<S, Error>> + Send>>;

/// Capability for establishing one outbound byte-stream transport.
///
/// The connector races several dials and keeps exactly one stream; a losing
/// stream is closed by dropping it, so `Stream` must release its transport on
/// drop (as `TcpStream` does).
pub trait Dial: Send + Sync + 'static {
    type Stream: Send + 'static;

    /// Dials `addr`, optionally binding the local end to `local` first.
    fn dial(&self, addr: SocketAddr, local: Option<IpAddr>) -> Dialing<Self::Stream>;
}

/// Blanket implementation for Arc-wrapped dialers.
impl<D: Dial> Dial for Arc<D> {
    type Stream = D::Stream;

    fn dial(&self, addr: SocketAddr, local: Option<IpAddr>) -> Dialing<Self::Stream> {
        (**self).dial(addr, local)
    }
}

/// TCP dialer with optional local interface binding.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpDialer;

impl TcpDialer {
    pub fn new() -> Self {
        Self
    }
}

impl Dial for TcpDialer {
    type Stream = TcpStream;

    fn dial(&self, addr: SocketAddr, local: Option<IpAddr>) -> Dialing<TcpStream> {
        Box::pin(async move {
            let wrap = |source| Error::Connect { addr, source };
            let socket = match addr {
                SocketAddr::V4(_) => TcpSocket::new_v4(),
                SocketAddr::V6(_) => TcpSocket::new_v6(),
            }
            .map_err(wrap)?;
            if let Some(ip) = local {
                socket.bind(SocketAddr::new(ip, 0)).map_err(wrap)?;
            }
            let stream = socket.connect(addr).await.map_err(wrap)?;
            tracing::debug!(%addr, "tcp connection established");
            Ok(stream)
        })
    }
}

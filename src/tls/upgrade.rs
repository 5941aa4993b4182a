use crate::base::error::Error;
use boring::ssl::{SslConnector, SslMethod};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_boring::SslStream;

/// Alias for the `Future` type returned by a TLS upgrader.
pub type Upgrading = Pin<Box<dyn Future<Output = Result<SslStream<TcpStream>, Error>> + Send>>;

/// Capability for wrapping a connected TCP stream in TLS.
///
/// A handshake failure must leave the raw transport closed; implementations
/// get that for free because the stream is consumed either way.
pub trait TlsUpgrade: Send + Sync {
    /// Performs a client-side handshake, verifying the peer against
    /// `hostname`.
    fn upgrade(&self, stream: TcpStream, hostname: &str) -> Upgrading;
}

/// Blanket implementation for Arc-wrapped upgraders.
impl<U: TlsUpgrade + ?Sized> TlsUpgrade for Arc<U> {
    fn upgrade(&self, stream: TcpStream, hostname: &str) -> Upgrading {
        (**self).upgrade(stream, hostname)
    }
}

/// TLS upgrader backed by BoringSSL.
#[derive(Clone)]
pub struct BoringUpgrader {
    connector: SslConnector,
}

impl BoringUpgrader {
    /// Creates an upgrader with a default client configuration (system trust
    /// roots, TLS version defaults).
    pub fn new() -> Result<Self, Error> {
        let builder = SslConnector::builder(SslMethod::tls())
            .map_err(|err| Error::TlsConfig(err.to_string()))?;
        Ok(Self {
            connector: builder.build(),
        })
    }

    /// Creates an upgrader from a caller-supplied connector, e.g. one with
    /// custom roots or ALPN.
    pub fn with_connector(connector: SslConnector) -> Self {
        Self { connector }
    }
}

impl TlsUpgrade for BoringUpgrader {
    fn upgrade(&self, stream: TcpStream, hostname: &str) -> Upgrading {
        let config = self.connector.configure();
        let hostname = hostname.to_owned();
        Box::pin(async move {
            let config = config.map_err(|err| Error::TlsConfig(err.to_string()))?;
            tracing::debug!(host = %hostname, "starting tls handshake");
            match tokio_boring::connect(config, &hostname, stream).await {
                Ok(tls) => {
                    tracing::debug!(host = %hostname, "tls handshake complete");
                    Ok(tls)
                }
                Err(err) => {
                    // Dropping the error drops the raw stream with it.
                    tracing::debug!(host = %hostname, error = ?err, "tls handshake failed");
                    Err(Error::Handshake {
                        hostname,
                        reason: format!("{err:?}"),
                    })
                }
            }
        })
    }
}

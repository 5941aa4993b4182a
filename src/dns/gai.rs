//! System resolver using the platform's getaddrinfo.

use crate::base::error::Error;
use crate::dns::resolve::{AddressFamily, Name, Resolve, Resolving};
use std::net::SocketAddr;

/// Resolver backed by the system's getaddrinfo, run on the runtime's
/// blocking pool via `tokio::net::lookup_host`.
///
/// Address order is whatever the platform returns; the connector applies its
/// own IPv6-preferred promotion on top.
#[derive(Clone, Copy, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, name: Name, port: u16, family: AddressFamily) -> Resolving {
        Box::pin(async move {
            tracing::debug!(host = %name, port, "resolving via getaddrinfo");
            let addrs = tokio::net::lookup_host((name.as_str().to_owned(), port))
                .await
                .map_err(|err| {
                    tracing::debug!(host = %name, error = %err, "resolution failed");
                    Error::Resolution {
                        host: name.to_string(),
                        source: err,
                    }
                })?;
            let addrs: Vec<SocketAddr> = addrs.filter(|addr| family.matches(&addr.ip())).collect();
            if addrs.is_empty() {
                return Err(Error::NoAddresses {
                    host: name.to_string(),
                });
            }
            tracing::debug!(host = %name, count = addrs.len(), "resolution complete");
            Ok(addrs)
        })
    }
}

//! Core resolution types and traits.

use crate::base::error::Error;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;

/// A target name to resolve into candidate addresses.
///
/// Lightweight wrapper around a hostname string.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct Name {
    host: Box<str>,
}

impl Name {
    #[inline]
    pub fn new(host: impl Into<Box<str>>) -> Self {
        Self { host: host.into() }
    }

    /// View the hostname as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.host
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name::new(value)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.host, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.host, f)
    }
}

/// Address-family filter applied to resolution results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressFamily {
    /// No filtering; both families pass.
    #[default]
    Unspec,
    V4,
    V6,
}

impl AddressFamily {
    /// Returns true if `ip` passes this filter.
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            AddressFamily::Unspec => true,
            AddressFamily::V4 => ip.is_ipv4(),
            AddressFamily::V6 => ip.is_ipv6(),
        }
    }

    /// The family an address belongs to.
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

/// Alias for the `Future` type returned by a resolver.
pub type Resolving = Pin<Box<dyn Future<Output = Result<Vec<SocketAddr>, Error>> + Send>>;

/// Trait for name resolution.
///
/// Implementations return an ordered candidate list; the connector preserves
/// that order apart from the IPv6/IPv4 promotion described in
/// [`crate::socket::prioritize`].
///
/// # Design Notes
///
/// - Uses `&self` for concurrent resolution without mutable access.
/// - Returns boxed futures for trait object compatibility.
pub trait Resolve: Send + Sync {
    /// Resolves `name` to candidate addresses carrying `port`, filtered by
    /// `family`.
    fn resolve(&self, name: Name, port: u16, family: AddressFamily) -> Resolving;
}

/// Blanket implementation for Arc-wrapped resolvers.
impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, name: Name, port: u16, family: AddressFamily) -> Resolving {
        (**self).resolve(name, port, family)
    }
}

/// Resolver backed by a fixed name-to-address map, with an optional fallback
/// for unmapped names.
///
/// Useful for testing without real DNS, forcing specific IPs for certain
/// hosts, and local development with custom hostnames.
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
    fallback: Option<Arc<dyn Resolve>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            fallback: None,
        }
    }

    /// Maps `host` to `addrs`, replacing any previous mapping.
    pub fn insert(mut self, host: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        self.entries.insert(host.into(), addrs);
        self
    }

    /// Sets the resolver consulted for names with no static entry.
    pub fn with_fallback(mut self, fallback: Arc<dyn Resolve>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolve for StaticResolver {
    fn resolve(&self, name: Name, port: u16, family: AddressFamily) -> Resolving {
        if let Some(addrs) = self.entries.get(name.as_str()) {
            let candidates: Vec<SocketAddr> = addrs
                .iter()
                .filter(|ip| family.matches(ip))
                .map(|ip| SocketAddr::new(*ip, port))
                .collect();
            return Box::pin(async move {
                if candidates.is_empty() {
                    Err(Error::NoAddresses {
                        host: name.to_string(),
                    })
                } else {
                    Ok(candidates)
                }
            });
        }
        match &self.fallback {
            Some(fallback) => fallback.resolve(name, port, family),
            None => Box::pin(async move {
                Err(Error::Resolution {
                    host: name.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no static entry"),
                })
            }),
        }
    }
}

impl fmt::Debug for StaticResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticResolver")
            .field("entry_count", &self.entries.len())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

//! Staggered, first-address-wins connection establishment.
//!
//! Implements the stateless Happy Eyeballs procedure (RFC 6555): candidate
//! addresses are dialed in order, each attempt given a bounded head start
//! before the next one launches, and the first attempt to connect wins. The
//! winner cancels the racing group, every other transport is closed before
//! the call returns, and on total failure the per-attempt errors are
//! aggregated in attempt order.

use crate::base::error::Error;
use crate::dns::{AddressFamily, GaiResolver, Name, Resolve};
use crate::scope::{CancelScope, TaskGroup};
use crate::socket::dial::{Dial, TcpDialer};
use crate::socket::stream::SocketStream;
use crate::sync::Event;
use crate::tls::{BoringUpgrader, TlsUpgrade};
use boring::ssl::SslConnector;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;

/// Delay before the next attempt launches when the current one has neither
/// connected nor failed.
pub const DEFAULT_STAGGER_DELAY: Duration = Duration::from_millis(250);

/// Options for [`Connector::connect`] and [`connect_tcp`].
#[derive(Clone)]
pub struct ConnectOptions {
    /// Local interface address to bind before connecting.
    pub local_address: Option<IpAddr>,
    /// Address-family filter for resolution. When `Unspec`, the family of
    /// `local_address` (if any) is used.
    pub family: AddressFamily,
    /// Upgrade the winning stream to TLS.
    pub tls: bool,
    /// Hostname to verify the server certificate against; defaults to the
    /// target. Setting this implies TLS.
    pub tls_hostname: Option<String>,
    /// Caller-supplied TLS connector. Setting this implies TLS.
    pub tls_connector: Option<SslConnector>,
    /// Perform the TLS shutdown handshake on close. Some protocols, such as
    /// HTTP, need this off.
    pub tls_standard_compatible: bool,
    /// Delay before starting the next connection attempt.
    pub stagger_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            local_address: None,
            family: AddressFamily::Unspec,
            tls: false,
            tls_hostname: None,
            tls_connector: None,
            tls_standard_compatible: true,
            stagger_delay: DEFAULT_STAGGER_DELAY,
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_address(mut self, local: IpAddr) -> Self {
        self.local_address = Some(local);
        self
    }

    pub fn with_family(mut self, family: AddressFamily) -> Self {
        self.family = family;
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_tls_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.tls_hostname = Some(hostname.into());
        self
    }

    pub fn with_tls_connector(mut self, connector: SslConnector) -> Self {
        self.tls_connector = Some(connector);
        self
    }

    pub fn with_tls_standard_compatible(mut self, standard_compatible: bool) -> Self {
        self.tls_standard_compatible = standard_compatible;
        self
    }

    pub fn with_stagger_delay(mut self, delay: Duration) -> Self {
        self.stagger_delay = delay;
        self
    }

    fn wants_tls(&self) -> bool {
        self.tls || self.tls_hostname.is_some() || self.tls_connector.is_some()
    }

    fn effective_family(&self) -> AddressFamily {
        match (self.family, self.local_address) {
            (AddressFamily::Unspec, Some(ip)) => AddressFamily::of(&ip),
            (family, _) => family,
        }
    }
}

/// Reorders candidates so that the first address is IPv6 (if available) and
/// the second is IPv4. The rest keep their relative order.
///
/// This realizes IPv6-preferred ordering without a full sort: the first IPv6
/// candidate moves to position 0, and once that promotion has happened the
/// next IPv4 candidate moves to position 1.
pub fn prioritize(addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    let mut out: Vec<SocketAddr> = Vec::with_capacity(addrs.len());
    let mut v6_found = false;
    let mut v4_found = false;
    for addr in addrs {
        if addr.is_ipv6() && !v6_found {
            v6_found = true;
            out.insert(0, addr);
        } else if addr.is_ipv4() && !v4_found && v6_found {
            v4_found = true;
            out.insert(1, addr);
        } else {
            out.push(addr);
        }
    }
    out
}

/// Establishes outbound connections by racing candidate addresses.
///
/// Composes a [`Resolve`] implementation, a [`Dial`] implementation, and an
/// optional [`TlsUpgrade`] implementation. The default connector uses the
/// system resolver and plain TCP.
pub struct Connector<D: Dial = TcpDialer> {
    resolver: Arc<dyn Resolve>,
    dialer: Arc<D>,
    upgrader: Option<Arc<dyn TlsUpgrade>>,
}

impl Connector<TcpDialer> {
    pub fn new() -> Self {
        Self::from_parts(Arc::new(GaiResolver::new()), Arc::new(TcpDialer::new()))
    }
}

impl Default for Connector<TcpDialer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dial> Connector<D> {
    /// Builds a connector from explicit collaborators.
    pub fn from_parts(resolver: Arc<dyn Resolve>, dialer: Arc<D>) -> Self {
        Self {
            resolver,
            dialer,
            upgrader: None,
        }
    }

    /// Replaces the resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Injects a TLS upgrader used when options request TLS without
    /// supplying a connector of their own.
    pub fn with_upgrader(mut self, upgrader: Arc<dyn TlsUpgrade>) -> Self {
        self.upgrader = Some(upgrader);
        self
    }

    /// Races connection attempts against the candidate list, returning the
    /// first stream to connect.
    ///
    /// One attempt task is spawned per candidate, each launch gated on the
    /// previous attempt's completion event for at most `stagger`. The first
    /// success records itself as the winner and cancels the racing group,
    /// which closes every other transport before this returns. Cancellation
    /// of `scope` propagates out as-is, with any already-connected stream
    /// closed first.
    pub async fn race(
        &self,
        scope: &CancelScope,
        candidates: Vec<SocketAddr>,
        local: Option<IpAddr>,
        stagger: Duration,
    ) -> Result<D::Stream, Error> {
        if candidates.is_empty() {
            return Err(Error::AllAttemptsFailed(Vec::new()));
        }
        tracing::debug!(count = candidates.len(), "racing connection attempts");

        let winner: Arc<Mutex<Option<D::Stream>>> = Arc::new(Mutex::new(None));
        let errors: Arc<Mutex<Vec<Option<Error>>>> = {
            let mut slots = Vec::new();
            slots.resize_with(candidates.len(), || None);
            Arc::new(Mutex::new(slots))
        };

        let group = TaskGroup::new(scope);
        let group_scope_id = group.scope().id();
        let mut interrupted: Option<Error> = None;

        for (index, addr) in candidates.into_iter().enumerate() {
            let event = Event::new();
            {
                let dialer = Arc::clone(&self.dialer);
                let winner = Arc::clone(&winner);
                let errors = Arc::clone(&errors);
                let group_scope = group.scope().clone();
                let event = event.clone();
                group.spawn(async move {
                    match dialer.dial(addr, local).await {
                        Ok(stream) => {
                            // Check-and-set under one lock: exactly one
                            // attempt can become the winner.
                            let mut slot = winner.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some(stream);
                                drop(slot);
                                tracing::debug!(%addr, index, "attempt won the race");
                                group_scope.cancel();
                            } else {
                                drop(slot);
                                tracing::debug!(%addr, index, "closing superfluous transport");
                                drop(stream);
                            }
                        }
                        Err(err) => {
                            tracing::debug!(%addr, index, error = %err, "attempt failed");
                            errors.lock().unwrap()[index] = Some(err);
                        }
                    }
                    event.set();
                    Ok(())
                });
            }

            // Give the attempt a head start; its event fires on success or
            // failure, so a slow loser never stalls the next launch.
            let gate = CancelScope::child_of(group.scope()).with_timeout(stagger);
            match gate
                .run(async {
                    event.wait().await;
                    Ok::<(), Error>(())
                })
                .await
            {
                Ok(_) => {}
                Err(err) => {
                    // A winner cancelling the group lands here too; sort it
                    // out from caller cancellation after the join.
                    interrupted = Some(err);
                    break;
                }
            }
        }

        let join_result = group.join().await;

        if let Some(err) = interrupted {
            match err.cancellation_origin() {
                Some(origin) if origin == group_scope_id => {}
                _ => {
                    // The caller's scope was cancelled: close anything that
                    // connected and let the signal keep propagating.
                    winner.lock().unwrap().take();
                    return Err(err);
                }
            }
        }
        if let Err(err) = join_result {
            winner.lock().unwrap().take();
            return Err(err);
        }

        if let Some(stream) = winner.lock().unwrap().take() {
            return Ok(stream);
        }
        // The caller's scope may have been cancelled after the last gate
        // passed, while the join was draining children.
        if let Some(origin) = scope.cancelled_by() {
            return Err(Error::Cancelled(origin));
        }

        let failures: Vec<Error> = errors.lock().unwrap().drain(..).flatten().collect();
        tracing::debug!(count = failures.len(), "all connection attempts failed");
        match failures.len() {
            1 => Err(failures.into_iter().next().expect("len checked")),
            _ => Err(Error::AllAttemptsFailed(failures)),
        }
    }

    /// Resolves `target`, reorders the candidates IPv6-first, and races them.
    ///
    /// A literal IP address bypasses resolution and produces a single
    /// candidate. TLS options are ignored here; use
    /// [`connect`](Connector::connect) for the full surface.
    pub async fn connect_raw(
        &self,
        scope: &CancelScope,
        target: &str,
        port: u16,
        options: &ConnectOptions,
    ) -> Result<D::Stream, Error> {
        let candidates = match target.parse::<IpAddr>() {
            Ok(ip) => vec![SocketAddr::new(ip, port)],
            Err(_) => {
                let resolved = self
                    .resolver
                    .resolve(Name::new(target), port, options.effective_family())
                    .await?;
                prioritize(resolved)
            }
        };
        self.race(scope, candidates, options.local_address, options.stagger_delay)
            .await
    }
}

impl<D: Dial<Stream = TcpStream>> Connector<D> {
    /// Connects to `target:port`, optionally upgrading the winning stream to
    /// TLS.
    ///
    /// Either returns exactly one usable stream or fails with one error
    /// describing every attempt made — or with the cancellation signal if
    /// `scope` was cancelled. A handshake failure closes the raw transport;
    /// there is no silent fallback to an unencrypted stream.
    pub async fn connect(
        &self,
        scope: &CancelScope,
        target: &str,
        port: u16,
        options: &ConnectOptions,
    ) -> Result<SocketStream, Error> {
        let stream = self.connect_raw(scope, target, port, options).await?;
        if !options.wants_tls() {
            return Ok(SocketStream::Tcp(stream));
        }
        let upgrader: Arc<dyn TlsUpgrade> = match (&options.tls_connector, &self.upgrader) {
            (Some(connector), _) => Arc::new(BoringUpgrader::with_connector(connector.clone())),
            (None, Some(upgrader)) => Arc::clone(upgrader),
            (None, None) => Arc::new(BoringUpgrader::new()?),
        };
        let hostname = options.tls_hostname.as_deref().unwrap_or(target);
        let tls = upgrader.upgrade(stream, hostname).await?;
        Ok(SocketStream::Tls {
            stream: Box::new(tls),
            standard_compatible: options.tls_standard_compatible,
        })
    }
}

/// Connects to `target:port` with the default connector under a fresh root
/// scope. The one-call entry point.
pub async fn connect_tcp(
    target: &str,
    port: u16,
    options: &ConnectOptions,
) -> Result<SocketStream, Error> {
    let scope = CancelScope::root();
    Connector::new().connect(&scope, target, port, options).await
}

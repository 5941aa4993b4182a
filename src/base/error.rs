use crate::scope::ScopeId;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors produced by scopes, task groups, and the connector.
///
/// `Cancelled` is the internal cancellation signal. It carries the identity of
/// the scope that raised it and is absorbed by that scope on exit; it never
/// escapes a `connect` call unless the caller's own enclosing scope was the
/// one cancelled.
#[derive(Debug, Error)]
pub enum Error {
    /// Name lookup failed.
    #[error("name resolution failed for {host}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Lookup succeeded but produced no usable addresses.
    #[error("no addresses resolved for {host}")]
    NoAddresses { host: String },

    /// A single dial attempt failed.
    #[error("connect to {addr} failed")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Every connection attempt failed. Per-attempt errors in attempt order.
    /// A lone failure is surfaced bare instead, so this carries two or more
    /// entries, or none when there was no candidate to try.
    #[error("all {} connection attempts failed", .0.len())]
    AllAttemptsFailed(Vec<Error>),

    /// TLS negotiation failed after the transport connected.
    #[error("TLS handshake with {hostname} failed: {reason}")]
    Handshake { hostname: String, reason: String },

    /// TLS connector construction or configuration failed.
    #[error("TLS configuration failed: {0}")]
    TlsConfig(String),

    /// A task launched with `TaskGroup::start` exited without ever calling
    /// `TaskStatus::started`.
    #[error("task exited without signaling readiness")]
    StartNotSignaled,

    /// A spawned child panicked.
    #[error("task panicked: {0}")]
    TaskPanic(String),

    /// More than one child of a task group failed.
    #[error("{} tasks failed", .0.len())]
    Aggregate(Vec<Error>),

    /// Raised by [`crate::scope::fail_after`] when its deadline expired.
    #[error("operation timed out")]
    TimedOut,

    /// Internal cancellation signal, tagged with the scope that raised it.
    #[error("cancelled by scope {0:?}")]
    Cancelled(ScopeId),
}

impl Error {
    /// Returns the origin scope if this is a cancellation signal.
    pub fn cancellation_origin(&self) -> Option<ScopeId> {
        match self {
            Error::Cancelled(id) => Some(*id),
            _ => None,
        }
    }
}

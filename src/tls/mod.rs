//! TLS upgrade of a connected stream.
//!
//! The connector consumes the [`TlsUpgrade`] capability; the shipped
//! implementation is [`BoringUpgrader`], a thin wrapper over BoringSSL's
//! client handshake.

mod upgrade;

pub use upgrade::{BoringUpgrader, TlsUpgrade, Upgrading};

//! # scopenet
//!
//! Structured-concurrency primitives for tokio, plus the one algorithm built
//! directly on them: a parallel, staggered, first-address-wins outbound TCP
//! connection procedure (Happy Eyeballs, RFC 6555) with an optional TLS
//! upgrade of the winning stream.
//!
//! ## Features
//!
//! - **Cancel scopes**: nestable cancellation boundaries with deadlines and
//!   shielding, absorbed by identity on exit
//! - **Task groups**: fire-and-forget spawning with deferred, ordered error
//!   aggregation at join time
//! - **Events**: single-set notification, the fundamental suspension point
//! - **Happy Eyeballs**: IPv6-preferred connection racing with bounded
//!   concurrency and deterministic loser cleanup
//! - **TLS upgrade**: BoringSSL handshake on the winning transport
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scopenet::{connect_tcp, ConnectOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let stream = connect_tcp("example.com", 443, &ConnectOptions::new().with_tls(true))
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Core types and error definitions
//! - [`sync`] - The [`Event`] notification primitive
//! - [`scope`] - Cancel scopes and task groups
//! - [`dns`] - Pluggable name resolution
//! - [`socket`] - Dialing and the connection-racing algorithm
//! - [`tls`] - TLS upgrade of a connected stream

pub mod base;
pub mod dns;
pub mod scope;
pub mod socket;
pub mod sync;
pub mod tls;

pub use base::error::Error;
pub use dns::{AddressFamily, GaiResolver, Name, Resolve, Resolving, StaticResolver};
pub use scope::{fail_after, move_on_after, CancelScope, ScopeExit, ScopeId, TaskGroup, TaskStatus};
pub use socket::{connect_tcp, ConnectOptions, Connector, Dial, Dialing, SocketStream, TcpDialer};
pub use sync::Event;
pub use tls::{BoringUpgrader, TlsUpgrade, Upgrading};

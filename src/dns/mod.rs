//! Name resolution.
//!
//! Provides pluggable resolution of target names into ordered candidate
//! address lists:
//! - System resolver (getaddrinfo via the runtime's blocking pool)
//! - Fixed name-to-address mapping with optional fallback
//!
//! The [`Resolve`] trait is the core abstraction; the connector consumes it
//! without caring where the addresses come from.

mod gai;
mod resolve;

pub use gai::GaiResolver;
pub use resolve::{AddressFamily, Name, Resolve, Resolving, StaticResolver};

//! Dialing and the connection-racing algorithm.
//!
//! - [`dial`]: the [`Dial`] capability and the TCP implementation
//! - [`stream`]: the plain-or-TLS [`SocketStream`] returned to callers
//! - [`connect`]: staggered, first-address-wins connection establishment

pub mod connect;
pub mod dial;
pub mod stream;

pub use connect::{connect_tcp, prioritize, ConnectOptions, Connector};
pub use dial::{Dial, Dialing, TcpDialer};
pub use stream::SocketStream;

//! Core types and error definitions.

pub mod error;

pub use error::Error;

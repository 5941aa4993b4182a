//! Synchronization primitives.

mod event;

pub use event::Event;

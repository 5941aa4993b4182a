//! Cancel scopes and task groups.
//!
//! The two building blocks of structured concurrency in this crate:
//! - [`CancelScope`]: a nestable cancellation boundary with an optional
//!   deadline and a shield flag
//! - [`TaskGroup`]: a set of concurrently running child tasks governed by one
//!   scope, with ordered error aggregation at join time
//!
//! Cancellation is cooperative. A scope records `cancel_called` and wakes its
//! subtree; the governed future is dropped at its next suspension point. On
//! exit a scope absorbs exactly the signal it raised itself (matched by scope
//! identity) and propagates anything originating from an ancestor.

mod cancel;
mod group;

pub use cancel::{fail_after, move_on_after, CancelScope, ScopeExit, ScopeId};
pub use group::{TaskGroup, TaskStatus};

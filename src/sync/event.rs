use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A single-set notification primitive.
///
/// The flag moves one way: once [`set`](Event::set) has been called, every
/// current waiter is released and every future [`wait`](Event::wait) returns
/// immediately. Handles are cheap clones sharing the same flag.
#[derive(Clone, Debug, Default)]
pub struct Event {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    set: AtomicBool,
    notify: Notify,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event. Idempotent; repeated calls are no-ops.
    pub fn set(&self) {
        if !self.inner.set.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if [`set`](Event::set) has been called.
    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }

    /// Suspends the caller until the event is set. Returns immediately if it
    /// already is.
    pub async fn wait(&self) {
        loop {
            if self.is_set() {
                return;
            }
            let mut notified = pin!(self.inner.notify.notified());
            // Register before the re-check so a set() racing with us cannot
            // slip between the check and the await.
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

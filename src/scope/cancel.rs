use crate::base::error::Error;
use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a [`CancelScope`], used to match a cancellation signal
/// to the scope that raised it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

/// A nestable cancellation boundary.
///
/// Scopes form a tree. Cancelling a scope cancels every descendant task at
/// its next suspension point, unless an intervening scope is shielded, in
/// which case delivery is deferred until the shield is cleared. A deadline
/// behaves exactly like an explicit [`cancel`](CancelScope::cancel) of the
/// scope that owns it, fired at the first suspension point at or after the
/// deadline.
///
/// Handles are cheap clones sharing the same scope record.
#[derive(Clone, Debug)]
pub struct CancelScope {
    state: Arc<ScopeState>,
}

#[derive(Debug)]
struct ScopeState {
    id: ScopeId,
    parent: Option<Arc<ScopeState>>,
    children: Mutex<Vec<Weak<ScopeState>>>,
    cancel_called: AtomicBool,
    shield: AtomicBool,
    deadline: Mutex<Option<Instant>>,
    notify: Notify,
}

/// How a scope's governed future ended: either it ran to completion, or the
/// scope's own cancellation (explicit or deadline) was absorbed.
#[derive(Debug)]
pub enum ScopeExit<T> {
    Completed(T),
    Cancelled,
}

impl<T> ScopeExit<T> {
    /// Returns the completion value, or `None` if the scope was cancelled.
    pub fn completed(self) -> Option<T> {
        match self {
            ScopeExit::Completed(value) => Some(value),
            ScopeExit::Cancelled => None,
        }
    }

    /// Returns true if the scope's own cancellation was absorbed.
    pub fn was_cancelled(&self) -> bool {
        matches!(self, ScopeExit::Cancelled)
    }
}

impl CancelScope {
    fn with_parent(parent: Option<Arc<ScopeState>>) -> Self {
        let state = Arc::new(ScopeState {
            id: ScopeId(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed)),
            parent,
            children: Mutex::new(Vec::new()),
            cancel_called: AtomicBool::new(false),
            shield: AtomicBool::new(false),
            deadline: Mutex::new(None),
            notify: Notify::new(),
        });
        if let Some(parent) = &state.parent {
            parent.children.lock().unwrap().push(Arc::downgrade(&state));
        }
        Self { state }
    }

    /// Creates a scope with no parent. Nothing outside it can cancel it.
    pub fn root() -> Self {
        Self::with_parent(None)
    }

    /// Creates a scope nested under `parent`.
    pub fn child_of(parent: &CancelScope) -> Self {
        Self::with_parent(Some(parent.state.clone()))
    }

    /// Sets an absolute deadline. Builder form of
    /// [`set_deadline`](CancelScope::set_deadline).
    pub fn with_deadline(self, deadline: Instant) -> Self {
        self.set_deadline(Some(deadline));
        self
    }

    /// Sets a deadline `delay` from now.
    pub fn with_timeout(self, delay: Duration) -> Self {
        self.set_deadline(Some(Instant::now() + delay));
        self
    }

    /// Sets the shield flag. Builder form of
    /// [`set_shield`](CancelScope::set_shield).
    pub fn with_shield(self, shield: bool) -> Self {
        self.state.shield.store(shield, Ordering::SeqCst);
        self
    }

    pub fn id(&self) -> ScopeId {
        self.state.id
    }

    /// Cancels this scope. Idempotent and irreversible: the first call marks
    /// the scope and wakes every descendant waiter; later calls are no-ops.
    pub fn cancel(&self) {
        if !self.state.cancel_called.swap(true, Ordering::SeqCst) {
            tracing::debug!(scope = self.state.id.0, "scope cancelled");
            wake_subtree(&self.state);
        }
    }

    /// Returns true if [`cancel`](CancelScope::cancel) has been called (or a
    /// deadline has fired).
    pub fn cancel_called(&self) -> bool {
        self.state.cancel_called.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.state.deadline.lock().unwrap()
    }

    /// Replaces the deadline. Waiters re-arm their timers immediately.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        *self.state.deadline.lock().unwrap() = deadline;
        wake_subtree(&self.state);
    }

    pub fn is_shielded(&self) -> bool {
        self.state.shield.load(Ordering::SeqCst)
    }

    /// Sets or clears the shield. A shielded scope does not observe ancestor
    /// cancellation; clearing the shield delivers any deferred cancellation
    /// at the next suspension point.
    pub fn set_shield(&self, shield: bool) {
        self.state.shield.store(shield, Ordering::SeqCst);
        if !shield {
            wake_subtree(&self.state);
        }
    }

    /// Returns the identity of the nearest scope whose cancellation is
    /// effective here, if any.
    ///
    /// The walk starts at this scope and moves outward. A shielded scope
    /// still observes its own cancellation but stops the walk before its
    /// ancestors.
    pub fn cancelled_by(&self) -> Option<ScopeId> {
        let mut current = Some(self.state.clone());
        while let Some(state) = current {
            if state.cancel_called.load(Ordering::SeqCst) {
                return Some(state.id);
            }
            if state.shield.load(Ordering::SeqCst) {
                return None;
            }
            current = state.parent.clone();
        }
        None
    }

    /// Nearest deadline visible from this scope, with the scope that owns it.
    /// A shielded scope's own deadline still counts; ancestors past a shield
    /// do not.
    fn nearest_deadline(&self) -> Option<(Instant, CancelScope)> {
        let mut best: Option<(Instant, Arc<ScopeState>)> = None;
        let mut current = Some(self.state.clone());
        while let Some(state) = current {
            if let Some(when) = *state.deadline.lock().unwrap() {
                if best.as_ref().map_or(true, |(earliest, _)| when < *earliest) {
                    best = Some((when, state.clone()));
                }
            }
            if state.shield.load(Ordering::SeqCst) {
                break;
            }
            current = state.parent.clone();
        }
        best.map(|(when, state)| (when, CancelScope { state }))
    }

    /// Resolves once cancellation is effective for this scope, yielding the
    /// origin scope's identity. Arms a timer for the nearest visible deadline
    /// and fires that scope's own `cancel()` on expiry.
    pub async fn cancelled(&self) -> ScopeId {
        loop {
            if let Some(origin) = self.cancelled_by() {
                return origin;
            }
            let mut notified = pin!(self.state.notify.notified());
            // Register before the re-check so a cancel() racing with us
            // cannot slip between the check and the await.
            notified.as_mut().enable();
            if let Some(origin) = self.cancelled_by() {
                return origin;
            }
            match self.nearest_deadline() {
                Some((when, owner)) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(when) => {
                            tracing::debug!(scope = owner.state.id.0, "deadline expired");
                            owner.cancel();
                        }
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Runs `fut` bracketed by this scope.
    ///
    /// The future is dropped as soon as cancellation becomes effective. On
    /// exit the scope absorbs exactly the signal it raised itself — explicit
    /// cancel or deadline expiry — and reports it as [`ScopeExit::Cancelled`].
    /// A signal originating from an ancestor propagates as
    /// [`Error::Cancelled`], so concurrently cancelled nested scopes each
    /// exit cleanly without misattributing another scope's signal.
    pub async fn run<T, F>(&self, fut: F) -> Result<ScopeExit<T>, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        tokio::select! {
            biased;
            origin = self.cancelled() => {
                if origin == self.id() {
                    Ok(ScopeExit::Cancelled)
                } else {
                    Err(Error::Cancelled(origin))
                }
            }
            result = fut => match result {
                Ok(value) => Ok(ScopeExit::Completed(value)),
                Err(Error::Cancelled(origin)) if origin == self.id() => Ok(ScopeExit::Cancelled),
                Err(err) => Err(err),
            },
        }
    }
}

/// Wakes every waiter in the subtree rooted at `state`. Shields are not
/// consulted here; wakeups are advisory and [`CancelScope::cancelled_by`] is
/// authoritative, which is what makes deferred delivery after
/// `set_shield(false)` work.
fn wake_subtree(state: &Arc<ScopeState>) {
    state.notify.notify_waiters();
    let children: Vec<Arc<ScopeState>> = {
        let mut guard = state.children.lock().unwrap();
        guard.retain(|child| child.strong_count() > 0);
        guard.iter().filter_map(Weak::upgrade).collect()
    };
    for child in children {
        wake_subtree(&child);
    }
}

/// Runs `fut` under a child scope of `parent` that expires after `delay`.
/// Expiry is absorbed and reported as [`ScopeExit::Cancelled`].
pub async fn move_on_after<T, F>(
    parent: &CancelScope,
    delay: Duration,
    fut: F,
) -> Result<ScopeExit<T>, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    CancelScope::child_of(parent).with_timeout(delay).run(fut).await
}

/// Like [`move_on_after`], but maps expiry to [`Error::TimedOut`].
pub async fn fail_after<T, F>(parent: &CancelScope, delay: Duration, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match move_on_after(parent, delay, fut).await? {
        ScopeExit::Completed(value) => Ok(value),
        ScopeExit::Cancelled => Err(Error::TimedOut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    async fn forever() -> Result<(), Error> {
        pending::<()>().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_completes_without_cancellation() {
        let scope = CancelScope::root();
        let exit = scope.run(async { Ok(7) }).await.unwrap();
        assert_eq!(exit.completed(), Some(7));
        assert!(!scope.cancel_called());
    }

    #[tokio::test]
    async fn test_own_cancel_is_absorbed() {
        let scope = CancelScope::root();
        scope.cancel();
        scope.cancel(); // idempotent
        let exit = scope.run(forever()).await.unwrap();
        assert!(exit.was_cancelled());
        assert!(scope.cancel_called());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_behaves_as_cancel() {
        let scope = CancelScope::root().with_timeout(Duration::from_millis(10));
        let exit = scope.run(forever()).await.unwrap();
        assert!(exit.was_cancelled());
        // Indistinguishable from an explicit cancel.
        assert!(scope.cancel_called());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ancestor_deadline_propagates() {
        let parent = CancelScope::root().with_timeout(Duration::from_millis(10));
        let child = CancelScope::child_of(&parent);
        let err = child.run(forever()).await.unwrap_err();
        assert_eq!(err.cancellation_origin(), Some(parent.id()));
    }

    #[tokio::test]
    async fn test_ancestor_cancel_propagates() {
        let parent = CancelScope::root();
        let child = CancelScope::child_of(&parent);
        parent.cancel();
        let err = child.run(forever()).await.unwrap_err();
        assert_eq!(err.cancellation_origin(), Some(parent.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shield_blocks_ancestor_cancellation() {
        let parent = CancelScope::root();
        let child = CancelScope::child_of(&parent).with_shield(true);
        parent.cancel();
        let exit = child
            .run(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(1)
            })
            .await
            .unwrap();
        assert_eq!(exit.completed(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearing_shield_delivers_deferred_cancellation() {
        let parent = CancelScope::root();
        let child = CancelScope::child_of(&parent).with_shield(true);
        parent.cancel();
        let handle = child.clone();
        let err = child
            .run(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                handle.set_shield(false);
                forever().await
            })
            .await
            .unwrap_err();
        assert_eq!(err.cancellation_origin(), Some(parent.id()));
    }

    #[tokio::test]
    async fn test_shield_does_not_block_own_cancel() {
        let scope = CancelScope::root().with_shield(true);
        scope.cancel();
        let exit = scope.run(forever()).await.unwrap();
        assert!(exit.was_cancelled());
    }

    #[tokio::test]
    async fn test_nested_scopes_absorb_only_their_own_signal() {
        // Inner cancelled: absorbed by inner, outer completes normally.
        let outer = CancelScope::root();
        let inner = CancelScope::child_of(&outer);
        inner.cancel();
        let exit = outer
            .run(async {
                let inner_exit = inner.run(forever()).await?;
                assert!(inner_exit.was_cancelled());
                Ok(2)
            })
            .await
            .unwrap();
        assert_eq!(exit.completed(), Some(2));

        // Outer cancelled mid-body: inner refuses to absorb, outer does.
        let outer = CancelScope::root();
        let inner = CancelScope::child_of(&outer);
        let outer_id = outer.id();
        let handle = outer.clone();
        let exit: ScopeExit<i32> = outer
            .run(async move {
                handle.cancel();
                let err = inner.run(forever()).await.unwrap_err();
                assert_eq!(err.cancellation_origin(), Some(outer_id));
                Err(err)
            })
            .await
            .unwrap();
        assert!(exit.was_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_on_after_completes_in_time() {
        let root = CancelScope::root();
        let exit = move_on_after(&root, Duration::from_secs(1), async { Ok(3) })
            .await
            .unwrap();
        assert_eq!(exit.completed(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_after_times_out() {
        let root = CancelScope::root();
        let err = fail_after(&root, Duration::from_millis(10), forever())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_deadline_rearms_waiters() {
        let scope = CancelScope::root().with_timeout(Duration::from_secs(60));
        let handle = scope.clone();
        let exit = scope
            .run(async move {
                handle.set_deadline(Some(Instant::now() + Duration::from_millis(5)));
                forever().await
            })
            .await
            .unwrap();
        assert!(exit.was_cancelled());
    }
}

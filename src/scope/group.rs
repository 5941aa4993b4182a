use crate::base::error::Error;
use crate::scope::cancel::{CancelScope, ScopeExit};
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A set of concurrently running child tasks governed by one [`CancelScope`].
///
/// Children are spawned fire-and-forget; their terminal outcomes are recorded
/// in spawn order and merged only at [`join`](TaskGroup::join) time. A child
/// failure does not cancel its siblings — only an explicit
/// [`cancel`](TaskGroup::cancel) does.
///
/// The group is not finished until `join` has been awaited; dropping it
/// without joining leaves children running detached.
#[derive(Debug)]
pub struct TaskGroup {
    scope: CancelScope,
    children: Mutex<Vec<JoinHandle<Outcome>>>,
}

/// Terminal state of one child, recorded per spawn slot.
#[derive(Debug)]
enum Outcome {
    Succeeded,
    Cancelled,
    Failed(Error),
}

/// Readiness handle passed to a task launched with
/// [`TaskGroup::start`]. Consumed by [`started`](TaskStatus::started).
#[derive(Debug)]
pub struct TaskStatus<T> {
    tx: oneshot::Sender<T>,
}

impl<T> TaskStatus<T> {
    /// Signals readiness, unblocking the `start` caller with `value`.
    pub fn started(self, value: T) {
        let _ = self.tx.send(value);
    }
}

impl TaskGroup {
    /// Creates a group whose scope is nested under `parent`.
    pub fn new(parent: &CancelScope) -> Self {
        Self {
            scope: CancelScope::child_of(parent),
            children: Mutex::new(Vec::new()),
        }
    }

    /// Creates a group with a root scope.
    pub fn root() -> Self {
        Self {
            scope: CancelScope::root(),
            children: Mutex::new(Vec::new()),
        }
    }

    /// The scope owning every child of this group.
    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Cancels the group's scope, and with it every outstanding child.
    pub fn cancel(&self) {
        self.scope.cancel();
    }

    /// Schedules `fut` as an independent child task parented to the group's
    /// scope. Returns immediately; the child's error, if any, is recorded and
    /// reported by [`join`](TaskGroup::join), not propagated synchronously.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let scope = self.scope.clone();
        let handle = tokio::spawn(async move {
            match scope.run(fut).await {
                Ok(ScopeExit::Completed(())) => Outcome::Succeeded,
                Ok(ScopeExit::Cancelled) => Outcome::Cancelled,
                // Ancestor-origin cancellation is clean termination for the
                // child; the ancestor's own exit handles the signal.
                Err(Error::Cancelled(_)) => Outcome::Cancelled,
                Err(err) => Outcome::Failed(err),
            }
        });
        self.children.lock().unwrap().push(handle);
    }

    /// Like [`spawn`](TaskGroup::spawn), but blocks the caller until the new
    /// task signals readiness with a value via [`TaskStatus::started`].
    ///
    /// Fails with [`Error::StartNotSignaled`] if the task reaches a terminal
    /// state without ever signaling; any error the task produced is still
    /// recorded for [`join`](TaskGroup::join).
    pub async fn start<T, F, Fut>(&self, f: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(TaskStatus<T>) -> Fut,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.spawn(f(TaskStatus { tx }));
        match rx.await {
            Ok(value) => Ok(value),
            Err(_) => Err(Error::StartNotSignaled),
        }
    }

    /// Waits for every child to reach a terminal state and merges their
    /// outcomes in spawn order.
    ///
    /// Cleanly cancelled children contribute nothing. Zero child errors is
    /// `Ok`; a single error propagates as-is; several combine into
    /// [`Error::Aggregate`]. A panicked child surfaces as
    /// [`Error::TaskPanic`] and is aggregated like any other failure.
    pub async fn join(self) -> Result<(), Error> {
        let children = self.children.into_inner().unwrap();
        let mut errors = Vec::new();
        for handle in children {
            match handle.await {
                Ok(Outcome::Succeeded | Outcome::Cancelled) => {}
                Ok(Outcome::Failed(err)) => errors.push(err),
                Err(join_err) => {
                    if join_err.is_panic() {
                        errors.push(Error::TaskPanic(panic_message(join_err)));
                    }
                    // An externally aborted child counts as cancelled.
                }
            }
        }
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.pop().expect("len checked")),
            _ => Err(Error::Aggregate(errors)),
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use std::io;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn connect_error(port: u16) -> Error {
        Error::Connect {
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        }
    }

    #[tokio::test]
    async fn test_join_ok_when_all_children_succeed() {
        let group = TaskGroup::root();
        for _ in 0..3 {
            group.spawn(async { Ok(()) });
        }
        group.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_single_error_propagates_bare() {
        let group = TaskGroup::root();
        group.spawn(async { Ok(()) });
        group.spawn(async { Err(connect_error(1)) });
        let err = group.join().await.unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
    }

    #[tokio::test]
    async fn test_multiple_errors_aggregate_in_spawn_order() {
        let group = TaskGroup::root();
        group.spawn(async { Err(connect_error(1)) });
        group.spawn(async { Err(connect_error(2)) });
        let err = group.join().await.unwrap_err();
        match err {
            Error::Aggregate(errors) => {
                assert_eq!(errors.len(), 2);
                let ports: Vec<u16> = errors
                    .iter()
                    .map(|e| match e {
                        Error::Connect { addr, .. } => addr.port(),
                        other => panic!("unexpected error {other:?}"),
                    })
                    .collect();
                assert_eq!(ports, vec![1, 2]);
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_failure_does_not_cancel_siblings() {
        let sibling_finished = Arc::new(AtomicBool::new(false));
        let group = TaskGroup::root();
        group.spawn(async { Err(connect_error(1)) });
        {
            let flag = sibling_finished.clone();
            group.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            });
        }
        let err = group.join().await.unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
        assert!(sibling_finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_terminates_children_cleanly() {
        let group = TaskGroup::root();
        for _ in 0..3 {
            group.spawn(async {
                pending::<()>().await;
                Ok(())
            });
        }
        group.cancel();
        group.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_group_scope_nests_under_parent() {
        let parent = CancelScope::root();
        let group = TaskGroup::new(&parent);
        group.spawn(async {
            pending::<()>().await;
            Ok(())
        });
        parent.cancel();
        group.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_returns_readiness_value() {
        let group = TaskGroup::root();
        let value = group
            .start(|status: TaskStatus<u16>| async move {
                status.started(4242);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(value, 4242);
        group.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_without_signal_is_programming_error() {
        let group = TaskGroup::root();
        let result = group
            .start(|_status: TaskStatus<u16>| async move { Ok(()) })
            .await;
        assert!(matches!(result, Err(Error::StartNotSignaled)));
        group.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_records_child_error_for_join() {
        let group = TaskGroup::root();
        let result = group
            .start(|_status: TaskStatus<u16>| async move { Err(connect_error(9)) })
            .await;
        assert!(matches!(result, Err(Error::StartNotSignaled)));
        let err = group.join().await.unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
    }

    #[tokio::test]
    async fn test_panicking_child_surfaces_as_error() {
        let group = TaskGroup::root();
        group.spawn(async { panic!("boom") });
        let err = group.join().await.unwrap_err();
        match err {
            Error::TaskPanic(message) => assert!(message.contains("boom")),
            other => panic!("expected panic error, got {other:?}"),
        }
    }
}

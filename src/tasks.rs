use std::future::Future;

use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::{
    sync::{CancellationToken, WaitForCancellationFuture},
    task::{task_tracker::TaskTrackerWaitFuture, TaskTracker},
};

/// This is a wrapper around a [`TaskTracker`] and a [`CancellationToken`]. It
/// is used to supervise the listener and session tasks of a server, and to
/// signal them to shut down.
///
/// When a [`Handle`] is provided, tasks are spawned on that handle. Otherwise,
/// they are spawned on the current runtime.
#[derive(Debug, Clone, Default)]
pub(crate) struct TaskSet {
    tasks: TaskTracker,
    token: CancellationToken,
    handle: Option<Handle>,
}

impl From<Handle> for TaskSet {
    fn from(handle: Handle) -> Self {
        Self::with_handle(handle)
    }
}

impl TaskSet {
    /// Create a new [`TaskSet`] with a handle.
    pub(crate) fn with_handle(handle: Handle) -> Self {
        Self {
            tasks: TaskTracker::new(),
            token: CancellationToken::new(),
            handle: Some(handle),
        }
    }

    /// Get a handle to the runtime that the task set is running on.
    ///
    /// ## Panics
    ///
    /// This will panic if called outside the context of a Tokio runtime.
    pub(crate) fn handle(&self) -> Handle {
        self.handle
            .clone()
            .unwrap_or_else(tokio::runtime::Handle::current)
    }

    /// Cancel the token. This is the "server is shutting down" signal.
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// True if the token has been cancelled.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Get a future that resolves when the token is fired.
    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Close the tracker, allowing [`Self::wait`] to resolve once all tasks
    /// are done.
    pub(crate) fn close(&self) {
        self.tasks.close();
    }

    /// True if the tracker has been closed.
    pub(crate) fn is_closed(&self) -> bool {
        self.tasks.is_closed()
    }

    /// Wait for the tracker to be closed and empty.
    pub(crate) fn wait(&self) -> TaskTrackerWaitFuture<'_> {
        self.tasks.wait()
    }

    /// Get a child [`TaskSet`]. This set will be fired when the parent
    /// set is fired, or may be fired independently.
    ///
    /// The child shares the parent's tracker, so waiting on the parent also
    /// waits for tasks spawned on the child.
    pub(crate) fn child(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
            token: self.token.child_token(),
            handle: self.handle.clone(),
        }
    }

    /// Prepare a future to be added to the task set, by wrapping it with a
    /// cancellation token.
    fn prep_fut<F>(&self, task: F) -> impl Future<Output = Option<F::Output>> + Send + 'static
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.token.clone();
        async move {
            tokio::select! {
                _ = token.cancelled() => None,
                result = task => Some(result),
            }
        }
    }

    /// Spawn a future on the provided handle, and add it to the task set. The
    /// future is dropped as soon as the token fires.
    ///
    /// ## Panics
    ///
    /// This will panic if called outside the context of a Tokio runtime when
    /// `self.handle` is `None`.
    pub(crate) fn spawn<F>(&self, task: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tasks.spawn_on(self.prep_fut(task), &self.handle())
    }

    /// Spawn a future that observes the token itself, and add it to the task
    /// set. The future is NOT dropped when the token fires, so it may run its
    /// own shutdown logic (e.g. sending a close frame).
    ///
    /// ## Panics
    ///
    /// This will panic if called outside the context of a Tokio runtime when
    /// `self.handle` is `None`.
    pub(crate) fn spawn_graceful<F, Fut>(&self, task: F) -> JoinHandle<Fut::Output>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        self.tasks
            .spawn_on(task(self.token.clone()), &self.handle())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn child_is_cancelled_with_parent() {
        let root = TaskSet::default();
        let child = root.child();

        assert!(!child.is_cancelled());
        root.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_running() {
        let root = TaskSet::default();
        let child = root.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn spawn_is_dropped_on_cancel() {
        let tasks = TaskSet::default();
        let jh = tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        tasks.cancel();
        assert_eq!(jh.await.unwrap(), None);
    }

    #[tokio::test]
    async fn graceful_task_runs_its_own_shutdown() {
        let tasks = TaskSet::default();
        let jh = tasks.spawn_graceful(|token| async move {
            token.cancelled().await;
            "cleaned up"
        });
        tasks.cancel();
        assert_eq!(jh.await.unwrap(), "cleaned up");
    }

    #[tokio::test]
    async fn wait_resolves_after_close() {
        let tasks = TaskSet::default();
        tasks.child().spawn(async {});
        tasks.close();
        assert!(tasks.is_closed());
        tokio::time::timeout(Duration::from_secs(5), tasks.wait())
            .await
            .unwrap();
    }
}

use crate::TaskSet;
use tokio_util::{sync::WaitForCancellationFuture, task::task_tracker::TaskTrackerWaitFuture};

/// Handle for stopping a running channel server.
///
/// Returned by [`Connect::serve`] and [`ChannelWsCfg::shutdown_signal`]. It
/// covers the accept loop, connections still in their handshake, and every
/// admitted session. Dropping it shuts the server down, so keep it alive for
/// as long as the server should run.
///
/// Cancelling has a different effect on each kind of task:
/// - The accept loop and pending handshakes are dropped. A connection that
///   was admitted mid-handshake is deregistered as its registration drops.
/// - Sessions observe the signal themselves. Each one deregisters from its
///   channel, then sends its peer a close frame with code 1001 (going away),
///   then exits. Readers waiting on an empty queue are woken for this.
///
/// Once every participant of a channel has left, the channel is gone from
/// the registry along with any undelivered values. The registry itself
/// outlives the server and may be handed to a new one.
///
/// [`Connect::serve`]: crate::transport::Connect::serve
/// [`ChannelWsCfg::shutdown_signal`]: crate::transport::ChannelWsCfg::shutdown_signal
#[derive(Debug)]
pub struct ServerShutdown {
    pub(crate) task_set: TaskSet,
}

impl From<TaskSet> for ServerShutdown {
    fn from(task_set: TaskSet) -> Self {
        Self::new(task_set)
    }
}

impl ServerShutdown {
    pub(crate) const fn new(task_set: TaskSet) -> Self {
        Self { task_set }
    }

    /// Wait until the server's tasks have all finished. Resolves only after
    /// [`Self::close`] has been called, so new sessions cannot start after
    /// it returns.
    pub fn wait(&self) -> TaskTrackerWaitFuture<'_> {
        self.task_set.wait()
    }

    /// Stop tracking new tasks for [`Self::wait`]. Running sessions are not
    /// affected.
    pub fn close(&self) {
        self.task_set.close();
    }

    /// True once [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.task_set.is_closed()
    }

    /// Signal the accept loop and all sessions to stop. Sessions close their
    /// connections with code 1001 in the background.
    pub fn cancel(&self) {
        self.task_set.cancel();
    }

    /// True once the server has been told to stop.
    pub fn is_cancelled(&self) -> bool {
        self.task_set.is_cancelled()
    }

    /// Resolves once the server has been told to stop.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.task_set.cancelled()
    }

    /// Stop the server and wait until every session has deregistered and
    /// sent its close frame.
    pub async fn shutdown(self) {
        self.cancel();
        self.close();
        self.wait().await;
    }
}

impl Drop for ServerShutdown {
    fn drop(&mut self) {
        self.task_set.cancel();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[tokio::test]
    async fn shutdown_waits_for_graceful_tasks() {
        let tasks = TaskSet::default();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        tasks.child().spawn_graceful(|token| async move {
            token.cancelled().await;
            // Stands in for a session sending its close frame.
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
        });

        ServerShutdown::from(tasks).shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropping_cancels() {
        let tasks = TaskSet::default();
        let shutdown = ServerShutdown::from(tasks.clone());
        assert!(!tasks.is_cancelled());

        drop(shutdown);
        assert!(tasks.is_cancelled());
    }
}

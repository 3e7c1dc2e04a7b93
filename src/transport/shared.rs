use crate::{
    transport::{session::Session, Admitted, Listener, MessageSink, MessageStream},
    ChannelRegistry, ConnectionId, TaskSet,
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, error};

/// How long an accepted connection may take to complete its handshake.
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept, so persistent errors (e.g. running out of
/// file descriptors) do not spin the loop.
pub(crate) const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The `ListenerTask` listens for new connections, and spawns a [`Session`]
/// for each.
pub(crate) struct ListenerTask<T: Listener> {
    pub(crate) listener: T,
    pub(crate) manager: SessionManager,
}

impl<T> ListenerTask<T>
where
    T: Listener,
{
    /// Task future, which will be run by [`Self::spawn`].
    ///
    /// This future is a simple loop that accepts new connections. Each
    /// connection's handshake runs in its own task, and the
    /// [`SessionManager`] spawns the session once it is admitted. Rejected
    /// handshakes are logged and do not stop the loop.
    pub(crate) async fn task_future(self) {
        let ListenerTask { listener, manager } = self;

        loop {
            let pending = match listener.accept().await {
                Ok(pending) => pending,
                Err(err) => {
                    error!(%err, "Failed to accept connection");
                    sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let conn_manager = manager.clone();
            manager.root_tasks.spawn(async move {
                let handshake = T::handshake(pending, &conn_manager.registry);
                match timeout(HANDSHAKE_TIMEOUT, handshake).await {
                    Ok(Ok(admitted)) => conn_manager.handle_new_connection(admitted),
                    Ok(Err(err)) => debug!(%err, "connection not admitted"),
                    Err(_) => debug!("handshake timed out"),
                }
            });
        }
    }

    /// Spawn the future produced by [`Self::task_future`].
    pub(crate) fn spawn(self) -> JoinHandle<Option<()>> {
        let tasks = self.manager.root_tasks.clone();
        let future = self.task_future();
        tasks.spawn(future)
    }
}

/// The `SessionManager` provides connections with IDs, and handles spawning
/// the [`Session`] for each connection.
#[derive(Debug, Clone)]
pub(crate) struct SessionManager {
    pub(crate) root_tasks: TaskSet,

    pub(crate) next_id: Arc<AtomicU64>,

    pub(crate) registry: ChannelRegistry,
}

impl SessionManager {
    /// Create a new manager spawning sessions into `root_tasks`.
    pub(crate) fn new(registry: ChannelRegistry, root_tasks: TaskSet) -> Self {
        Self {
            root_tasks,
            next_id: Arc::new(AtomicU64::new(0)),
            registry,
        }
    }

    /// Set the runtime handle on which sessions are spawned.
    #[cfg(feature = "axum")]
    pub(crate) fn with_handle(self, handle: tokio::runtime::Handle) -> Self {
        Self {
            root_tasks: handle.into(),
            ..self
        }
    }

    /// Increment the connection ID counter and return an unused ID.
    fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawn the [`Session`] for an admitted connection.
    pub(crate) fn handle_new_connection<S, R>(&self, admitted: Admitted<S, R>)
    where
        S: MessageSink,
        R: MessageStream,
    {
        let conn_id = self.next_id();
        debug!(
            conn_id,
            channel = %admitted.registration.channel(),
            direction = %admitted.registration.direction(),
            "admitted connection"
        );

        let session = Session::new(conn_id, admitted);
        self.root_tasks.child().spawn_graceful(|token| async move {
            // Errors are logged by the session itself.
            let _ = session.task_future(token).await;
        });
    }
}

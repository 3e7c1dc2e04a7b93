use crate::{
    transport::{
        shared::{ListenerTask, SessionManager},
        CloseFrame, Inbound, Outbound, ServerShutdown,
    },
    ChannelRegistry, Registration, TaskSet,
};
use std::future::Future;
use tokio::{runtime::Handle, sync::mpsc};
use tokio_stream::Stream;

/// Configuration objects for connecting a [`Listener`].
///
/// This object is intended to capture all connection-related configuration and
/// setup, and output only the configured [`Listener`]. This keeps socket
/// options, TLS and the like out of the channel logic.
pub trait Connect: Send + Sync + Sized {
    /// The listener type produced by the connect object.
    type Listener: Listener;

    /// The error type for instantiating a [`Listener`].
    type Error: core::error::Error + 'static;

    /// Create the listener
    fn make_listener(self) -> impl Future<Output = Result<Self::Listener, Self::Error>> + Send;

    /// Instantiate and run a task to accept connections on the given runtime,
    /// returning a shutdown signal.
    ///
    /// Every accepted connection joins a channel in `registry`. The registry
    /// may be shared with other servers.
    fn serve_on_handle(
        self,
        registry: ChannelRegistry,
        handle: Handle,
    ) -> impl Future<Output = Result<ServerShutdown, Self::Error>> + Send {
        async move {
            let root_tasks: TaskSet = handle.into();

            ListenerTask {
                listener: self.make_listener().await?,
                manager: SessionManager::new(registry, root_tasks.clone()),
            }
            .spawn();
            Ok(root_tasks.into())
        }
    }

    /// Instantiate and run a task to accept connections, returning a shutdown
    /// signal.
    fn serve(
        self,
        registry: ChannelRegistry,
    ) -> impl Future<Output = Result<ServerShutdown, Self::Error>> + Send {
        self.serve_on_handle(registry, Handle::current())
    }
}

/// A connection that completed its handshake and joined a channel.
#[derive(Debug)]
pub struct Admitted<S, R> {
    /// The connection's claim on its channel.
    pub registration: Registration,
    /// Outbound half of the connection.
    pub sink: S,
    /// Inbound half of the connection.
    pub stream: R,
}

/// A [`Listener`] accepts incoming connections, admits them to a channel
/// during the handshake, and splits them into a [`MessageSink`] and
/// [`MessageStream`].
///
/// Accepting is split in two. [`Listener::accept`] only takes the raw
/// connection off the listener. [`Listener::handshake`] then runs in the
/// connection's own task, so a peer that stalls its handshake never holds
/// up other connections.
///
/// Admission happens during the handshake so that malformed requests and
/// duplicate readers are rejected before the connection is upgraded. The
/// listener should use [`ChannelRegistry::admit`] for this.
pub trait Listener: Send + Sync + 'static {
    /// A connection that has been accepted but not yet upgraded.
    type Pending: Send + 'static;
    /// The sink type produced by the listener.
    type Sink: MessageSink;
    /// The stream type produced by the listener.
    type Stream: MessageStream;
    /// The error type for the listener. Rejected handshakes are reported
    /// as errors.
    type Error: core::error::Error + Send + 'static;

    /// Accept an inbound connection.
    fn accept(&self) -> impl Future<Output = Result<Self::Pending, Self::Error>> + Send;

    /// Complete the handshake of an accepted connection and admit it to a
    /// channel in `registry`.
    fn handshake(
        pending: Self::Pending,
        registry: &ChannelRegistry,
    ) -> impl Future<Output = Result<Admitted<Self::Sink, Self::Stream>, Self::Error>> + Send;
}

/// The outbound half of a connection.
pub trait MessageSink: Send + 'static {
    /// Error type for the sink.
    type Error: core::error::Error + 'static;

    /// Send a text frame.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a close frame. Errors are expected if the transport has already
    /// answered the peer's close handshake on its own.
    fn send_close(
        &mut self,
        frame: Option<CloseFrame>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl MessageSink for mpsc::UnboundedSender<Outbound> {
    type Error = mpsc::error::SendError<Outbound>;

    async fn send_text(&mut self, text: String) -> Result<(), Self::Error> {
        self.send(Outbound::Text(text))
    }

    async fn send_close(&mut self, frame: Option<CloseFrame>) -> Result<(), Self::Error> {
        self.send(Outbound::Close(frame))
    }
}

/// The inbound half of a connection. The stream ending without an
/// [`Inbound::Close`] means the peer vanished.
pub trait MessageStream: Stream<Item = Inbound> + Send + Unpin + 'static {}

impl<T> MessageStream for T where T: Stream<Item = Inbound> + Send + Unpin + 'static {}

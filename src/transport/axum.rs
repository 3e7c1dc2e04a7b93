//! WebSocket channel endpoint for [`axum`]
//!
//! How this works:
//! `axum` does not provide a connection pattern that allows us to implement
//! [`Listener`] or [`Connect`] directly. Instead, it uses a
//! [`WebSocketUpgrade`] to upgrade a connection to a WebSocket. The
//! [`msg_channel_websocket`] handler admits the connection before upgrading,
//! and hands the upgraded socket to the same session machinery the
//! [`Listener`] path uses. Its [`State`] is a [`ChannelWsCfg`].
//!
//! [`Listener`]: crate::transport::Listener
//! [`Connect`]: crate::transport::Connect

use crate::{
    transport::{
        shared::SessionManager, Admitted, CloseFrame, Inbound, MessageSink, ServerShutdown,
    },
    ChannelRegistry, TaskSet, DEFAULT_CHANNEL_PATH,
};
use axum::{
    extract::{
        ws::{self, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, Stream, StreamExt,
};
use std::{
    pin::Pin,
    task::{ready, Context, Poll},
};
use tokio::runtime::Handle;
use tracing::{debug, trace};

pub(crate) type SendHalf = SplitSink<WebSocket, Message>;
pub(crate) type RecvHalf = SplitStream<WebSocket>;

/// Configuration details for channel connections using
/// [`axum::extract::ws`].
///
/// The main points of configuration are:
/// - The [`ChannelRegistry`] connections join. Pass a shared registry to
///   serve the same channels from several routes or servers.
/// - The runtime [`Handle`] on which to execute sessions, which can be set
///   with [`Self::with_handle`]. This defaults to the current thread's
///   runtime handle.
///
/// This struct is used as the [`State`] for the [`msg_channel_websocket`]
/// handler.
///
/// # Note
///
/// If [`ChannelWsCfg`] is NOT used within a `tokio` runtime,
/// [`ChannelWsCfg::with_handle`] MUST be called to set the runtime handle
/// before any connections are upgraded. Attempting to execute a task without
/// an active runtime will result in a panic.
///
/// # Example
///
/// ```no_run
/// # use msg_channel::{ChannelRegistry, transport::{msg_channel_websocket, ChannelWsCfg}};
/// # async fn _main() {
/// let cfg = ChannelWsCfg::new(ChannelRegistry::new());
///
/// let app: axum::Router = axum::Router::new()
///     .route("/msg_channel", axum::routing::any(msg_channel_websocket))
///     .with_state(cfg);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
/// axum::serve(listener, app).await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelWsCfg {
    inner: SessionManager,
}

impl Default for ChannelWsCfg {
    fn default() -> Self {
        Self::new(ChannelRegistry::new())
    }
}

impl From<ChannelRegistry> for ChannelWsCfg {
    fn from(registry: ChannelRegistry) -> Self {
        Self::new(registry)
    }
}

impl ChannelWsCfg {
    /// Create a new [`ChannelWsCfg`] admitting connections to `registry`.
    pub fn new(registry: ChannelRegistry) -> Self {
        Self {
            inner: SessionManager::new(registry, TaskSet::default()),
        }
    }

    /// Set the handle on which to execute sessions.
    ///
    /// This replaces the task set, so a [`ServerShutdown`] obtained earlier
    /// from [`Self::shutdown_signal`] no longer applies.
    pub fn with_handle(self, handle: Handle) -> Self {
        Self {
            inner: self.inner.with_handle(handle),
        }
    }

    /// The registry connections join.
    pub const fn registry(&self) -> &ChannelRegistry {
        &self.inner.registry
    }

    /// Get the shutdown signal for sessions spawned by this config. Dropping
    /// or cancelling it closes every session, including ones spawned by
    /// clones of this config.
    pub fn shutdown_signal(&self) -> ServerShutdown {
        self.inner.root_tasks.clone().into()
    }

    /// Build an [`axum::Router`] serving the endpoint at `path`.
    pub fn into_router(self, path: &str) -> axum::Router {
        axum::Router::new()
            .route(path, any(msg_channel_websocket))
            .with_state(self)
    }

    /// Build an [`axum::Router`] serving the endpoint at
    /// [`DEFAULT_CHANNEL_PATH`].
    pub fn into_default_router(self) -> axum::Router {
        self.into_router(DEFAULT_CHANNEL_PATH)
    }
}

/// Axum handler for channel connections.
///
/// Reads `uuid` and `direction` from the query string and joins the channel
/// before upgrading. A malformed request is rejected with
/// `400 Bad Request`, a second reader on a channel with
/// `409 Conflict`.
///
/// # Examples
///
/// ```no_run
/// # use msg_channel::{ChannelRegistry, transport::{msg_channel_websocket, ChannelWsCfg}};
/// # fn _main(registry: ChannelRegistry) -> axum::Router {
/// // Two routes sharing the same channels.
/// axum::Router::new()
///     .route("/msg_channel", axum::routing::any(msg_channel_websocket))
///     .route("/legacy/msg_channel", axum::routing::any(msg_channel_websocket))
///     .with_state(ChannelWsCfg::new(registry))
/// # }
/// ```
pub async fn msg_channel_websocket(
    ws: WebSocketUpgrade,
    uri: Uri,
    State(cfg): State<ChannelWsCfg>,
) -> Response {
    let registration = match cfg.inner.registry.admit(uri.query()) {
        Ok(registration) => registration,
        Err(err) => {
            debug!(%err, "rejecting connection");
            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
            return (status, err.to_string()).into_response();
        }
    };

    // If the upgrade never completes, the callback and its registration are
    // dropped, which deregisters.
    ws.on_upgrade(move |ws| {
        let (sink, stream) = ws.split();

        cfg.inner.handle_new_connection(Admitted {
            registration,
            sink,
            stream: AxumFrameStream::from(stream),
        });

        async {}
    })
}

/// Simple stream adapter for extracting text and close frames from a
/// [`WebSocket`].
#[derive(Debug)]
struct AxumFrameStream {
    inner: RecvHalf,
    complete: bool,
}

impl From<RecvHalf> for AxumFrameStream {
    fn from(inner: RecvHalf) -> Self {
        Self {
            inner,
            complete: false,
        }
    }
}

impl AxumFrameStream {
    /// Handle an incoming [`Message`]
    fn handle(&self, message: Message) -> Option<Inbound> {
        match message {
            Message::Text(text) => Some(Inbound::Text(text.as_str().to_owned())),
            Message::Close(frame) => Some(Inbound::Close(
                frame.map(|f| CloseFrame::new(f.code, f.reason.as_str())),
            )),
            _ => None,
        }
    }
}

impl Stream for AxumFrameStream {
    type Item = Inbound;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.complete {
                return Poll::Ready(None);
            }

            let msg = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(msg)) => msg,
                Some(Err(err)) => {
                    debug!(%err, "WS client has gone away");
                    self.complete = true;
                    return Poll::Ready(None);
                }
                None => {
                    self.complete = true;
                    return Poll::Ready(None);
                }
            };

            match self.handle(msg) {
                Some(item @ Inbound::Close(_)) => {
                    self.complete = true;
                    return Poll::Ready(Some(item));
                }
                Some(item) => return Poll::Ready(Some(item)),
                None => continue,
            }
        }
    }
}

impl MessageSink for SendHalf {
    type Error = axum::Error;

    async fn send_text(&mut self, text: String) -> Result<(), Self::Error> {
        self.send(Message::text(text)).await
    }

    async fn send_close(&mut self, frame: Option<CloseFrame>) -> Result<(), Self::Error> {
        let frame = frame.map(|f| ws::CloseFrame {
            code: f.code,
            reason: f.reason.into(),
        });
        if let Err(err) = self.send(Message::Close(frame)).await {
            // Most likely the peer closed first, and the socket has queued
            // the echo of its frame. Flushing sends it.
            trace!(%err, "close frame refused, flushing pending reply");
            return self.flush().await;
        }
        Ok(())
    }
}

//! Websocket serving utils for channels.
//!
//! This module connects sockets to a [`ChannelRegistry`]. Built-in support is
//! provided for raw websockets over TCP (`ws` feature) and for [`axum`]
//! (`axum` feature), and a trait system is provided for custom connection
//! types.
//!
//! ## Usage
//!
//! Typically users want to use a [`Connect`] implementor to create a server
//! using [`Connect::serve`]. This will create a [`Listener`]. [`Listener`]s
//! accept client connections, admit them to a channel, and spawn a session
//! task for each connection.
//!
//! With [`axum`], mount [`msg_channel_websocket`] with a [`ChannelWsCfg`] as
//! state instead.
//!
//! ## Admission
//!
//! A connection names its channel and role in the query string of its
//! upgrade request, e.g. `/msg_channel?uuid=<id>&direction=read`. The
//! listener joins the channel before completing the handshake. A request
//! missing either parameter is rejected with `400`, and a second reader on
//! a channel with `409`. The existing reader is unaffected.
//!
//! ## Sessions
//!
//! Each admitted connection gets one session task:
//! - A `read` session waits on the channel queue, the peer, and the server
//!   shutdown signal at once. Queued values are sent to the peer as text
//!   frames in FIFO order. Text sent by the peer is ignored.
//! - A `write` session reads text frames from the peer, checks each is valid
//!   JSON, and pushes it onto the channel queue unchanged. Invalid JSON
//!   terminates the session with close code 1007.
//!
//! When the peer sends a close frame, the session deregisters and echoes the
//! frame back. When the peer vanishes, the session deregisters. When the
//! server shuts down, the session deregisters and sends close code 1001.
//! The last participant to leave a channel takes its queue with it.
//!
//! ## Backpressure
//!
//! There is none. The channel queue is unbounded, so a writer whose channel
//! has no reader (or a slow one) grows memory without limit.
//!
//! #### Custom Listener
//!
//! [`Listener`]'s associated sink and stream types are used to write to and
//! read from the connection. These types must implement [`MessageSink`] and
//! [`MessageStream`] respectively. [`Listener::accept`] should return as
//! soon as a raw connection is available; the handshake runs separately, in
//! the connection's own task, via [`Listener::handshake`]. Listeners admit
//! connections there with [`ChannelRegistry::admit`].
//!
//! [`ChannelRegistry`]: crate::ChannelRegistry
//! [`ChannelRegistry::admit`]: crate::ChannelRegistry::admit

mod frame;
pub use frame::{CloseFrame, Inbound, Outbound};

mod session;

mod shared;

mod shutdown;
pub use shutdown::ServerShutdown;

mod r#trait;
pub use r#trait::{Admitted, Connect, Listener, MessageSink, MessageStream};

#[cfg(feature = "ws")]
mod ws;
#[cfg(feature = "ws")]
pub use ws::{WsAcceptError, WsFrameStream};

#[cfg(feature = "axum")]
mod axum;
#[cfg(feature = "axum")]
pub use axum::{msg_channel_websocket, ChannelWsCfg};

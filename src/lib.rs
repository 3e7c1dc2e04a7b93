//! msg-channel: single-reader, multi-writer JSON channels over websockets.
//!
//! A channel is a named FIFO queue. Any number of writer connections push
//! JSON values onto it, and at most one reader connection receives them, in
//! the order the queue received them. Channels are created by their first
//! participant and dropped, along with any undelivered values, when their
//! last participant disconnects.
//!
//! This is meant for wiring a process that emits events to a test harness
//! that consumes them, without either side caring about the other's
//! connection lifecycle.
//!
//! ## Basic usage
//!
//! The [`ChannelRegistry`] holds every live channel. It is cheap to clone and
//! is passed to whichever server accepts connections.
//!
//! ```no_run
//! # #[cfg(feature = "ws")]
//! # {
//! use msg_channel::{transport::Connect, ChannelRegistry};
//!
//! # async fn _main() {
//! let registry = ChannelRegistry::new();
//! let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 8000));
//! // The shutdown object will stop the server when dropped.
//! let shutdown = addr.serve(registry.clone()).await.unwrap();
//! # }}
//! ```
//!
//! Clients connect with `?uuid=<channel id>&direction=read|write` in the
//! query string. With the `axum` feature, the endpoint can instead be
//! mounted on an [`axum::Router`]:
//!
//! ```no_run
//! # #[cfg(feature = "axum")]
//! # {
//! use msg_channel::{transport::ChannelWsCfg, ChannelRegistry};
//!
//! # async fn _main() {
//! let app = ChannelWsCfg::new(ChannelRegistry::new()).into_default_router();
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # }}
//! ```
//!
//! See the [`transport`] module documentation for the connection protocol.
//!
//! [`axum::Router`]: https://docs.rs/axum/latest/axum/struct.Router.html

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod channel;
pub use channel::{ChannelQueue, ChannelRegistry, ChannelSnapshot, Registration};

#[cfg(feature = "ws")]
pub mod client;

mod error;
pub use error::{AdmitError, ChannelError, RequestError, SessionError};

mod primitives;
pub use primitives::{ChannelId, ChannelRequest, ConnectionId, Direction};

mod tasks;
pub(crate) use tasks::TaskSet;

pub mod transport;

/// Path the endpoint is conventionally mounted at.
pub const DEFAULT_CHANNEL_PATH: &str = "/msg_channel";

/// Re-export of the `serde_json` crate, primarily to provide the `RawValue` type.
pub use serde_json::{self, value::RawValue};

#[cfg(test)]
pub(crate) mod test_utils {
    use serde_json::value::RawValue;

    #[track_caller]
    pub(crate) fn assert_rv_eq(a: &RawValue, b: &str) {
        let left = serde_json::from_str::<serde_json::Value>(a.get()).unwrap();
        let right = serde_json::from_str::<serde_json::Value>(b).unwrap();
        assert_eq!(left, right);
    }

    #[track_caller]
    pub(crate) fn rv(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_owned()).unwrap()
    }
}

//! Client helpers for talking to a channel endpoint.
//!
//! A [`SendChannel`] connects as a writer and sends JSON values. A
//! [`RecvChannel`] connects as the channel's reader and yields values in the
//! order the channel received them. [`channel`] creates a fresh channel id and
//! connects one of each.
//!
//! ```no_run
//! # async fn _main() -> Result<(), msg_channel::client::ClientError> {
//! let (mut recv, mut send) = msg_channel::client::channel("ws://127.0.0.1:8000/msg_channel").await?;
//! send.send(&serde_json::json!({"x": 1})).await?;
//! let value: serde_json::Value = recv.next().await?;
//! # Ok(())
//! # }
//! ```

use crate::{transport::CloseFrame, ChannelId, ChannelRequest, Direction};
use futures_util::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors produced by the client helpers.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The endpoint URL could not be parsed.
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    /// The websocket connection failed. A rejected upgrade (malformed
    /// request, duplicate reader) surfaces here as an HTTP error.
    #[error(transparent)]
    Ws(#[from] tungstenite::Error),
    /// A value could not be serialized or deserialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The server closed the connection, with the close frame it sent if
    /// any.
    #[error("channel closed")]
    Closed(Option<CloseFrame>),
}

/// Build the url for joining `channel` in `direction` at `endpoint`. Existing
/// query parameters on `endpoint` are kept.
pub fn channel_url(
    endpoint: &str,
    channel: &ChannelId,
    direction: Direction,
) -> Result<url::Url, ClientError> {
    let mut url = url::Url::parse(endpoint)?;
    url.query_pairs_mut()
        .append_pair(ChannelRequest::CHANNEL_PARAM, channel.as_str())
        .append_pair(ChannelRequest::DIRECTION_PARAM, direction.as_str());
    Ok(url)
}

/// Drive `socket` until the server's close frame arrives.
async fn await_close(socket: &mut Socket) -> Result<Option<CloseFrame>, ClientError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Close(frame))) => return Ok(frame.map(Into::into)),
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(err.into()),
            None => return Ok(None),
        }
    }
}

/// Start the close handshake with `frame` and return the server's reply.
async fn close_with(
    mut socket: Socket,
    frame: CloseFrame,
) -> Result<Option<CloseFrame>, ClientError> {
    socket.close(Some(frame.into())).await?;
    await_close(&mut socket).await
}

async fn connect(
    endpoint: &str,
    channel: &ChannelId,
    direction: Direction,
) -> Result<Socket, ClientError> {
    let url = channel_url(endpoint, channel, direction)?;
    let (socket, _) = connect_async(url.as_str()).await?;
    debug!(%channel, %direction, "connected");
    Ok(socket)
}

/// The writing end of a channel.
#[derive(Debug)]
pub struct SendChannel {
    channel: ChannelId,
    socket: Socket,
}

impl SendChannel {
    /// Connect to `channel` as a writer.
    pub async fn connect(endpoint: &str, channel: ChannelId) -> Result<Self, ClientError> {
        let socket = connect(endpoint, &channel, Direction::Write).await?;
        Ok(Self { channel, socket })
    }

    /// The channel this end writes to.
    pub const fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Serialize `msg` and send it to the channel.
    pub async fn send<T: Serialize + ?Sized>(&mut self, msg: &T) -> Result<(), ClientError> {
        let text = serde_json::to_string(msg)?;
        trace!(channel = %self.channel, %text, "send");
        self.send_raw(text).await
    }

    /// Send a text frame as-is. The server terminates the connection if it is
    /// not valid JSON.
    pub async fn send_raw(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        self.socket.send(Message::text(text.into())).await?;
        Ok(())
    }

    /// Close the connection, leaving the channel.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.socket.close(None).await?;
        Ok(())
    }

    /// Close the connection with `frame`, and return the frame the server
    /// answered with.
    pub async fn close_with(self, frame: CloseFrame) -> Result<Option<CloseFrame>, ClientError> {
        close_with(self.socket, frame).await
    }

    /// Wait for the server to close the connection, e.g. after a malformed
    /// payload or on shutdown. Returns the server's close frame.
    pub async fn closed(&mut self) -> Result<Option<CloseFrame>, ClientError> {
        await_close(&mut self.socket).await
    }
}

/// The reading end of a channel. Each channel has at most one.
#[derive(Debug)]
pub struct RecvChannel {
    channel: ChannelId,
    socket: Socket,
}

impl RecvChannel {
    /// Connect to `channel` as its reader. Fails if the channel already has
    /// a reader.
    pub async fn connect(endpoint: &str, channel: ChannelId) -> Result<Self, ClientError> {
        let socket = connect(endpoint, &channel, Direction::Read).await?;
        Ok(Self { channel, socket })
    }

    /// The channel this end reads from.
    pub const fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Wait for the next value on the channel.
    pub async fn next<T: DeserializeOwned>(&mut self) -> Result<T, ClientError> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!(channel = %self.channel, text = text.as_str(), "recv");
                    return Ok(serde_json::from_str(text.as_str())?);
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(ClientError::Closed(frame.map(Into::into)))
                }
                None => return Err(ClientError::Closed(None)),
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err.into()),
            }
        }
    }

    /// Close the connection, leaving the channel.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.socket.close(None).await?;
        Ok(())
    }

    /// Close the connection with `frame`, and return the frame the server
    /// answered with.
    pub async fn close_with(self, frame: CloseFrame) -> Result<Option<CloseFrame>, ClientError> {
        close_with(self.socket, frame).await
    }
}

/// Create a channel with a fresh random id, and connect its reader and a
/// writer.
pub async fn channel(endpoint: &str) -> Result<(RecvChannel, SendChannel), ClientError> {
    let id = ChannelId::random();
    let (recv, send) = tokio::try_join!(
        RecvChannel::connect(endpoint, id.clone()),
        SendChannel::connect(endpoint, id),
    )?;
    Ok((recv, send))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_channel_url() {
        let url = channel_url(
            "ws://localhost:8000/msg_channel",
            &ChannelId::new("abc"),
            Direction::Read,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8000/msg_channel?uuid=abc&direction=read"
        );

        let req = ChannelRequest::from_query(url.query()).unwrap();
        assert_eq!(req, ChannelRequest::new("abc".into(), Direction::Read));
    }

    #[test]
    fn bad_endpoint_is_an_error() {
        let err = channel_url("not a url", &ChannelId::random(), Direction::Write).unwrap_err();
        assert!(matches!(err, ClientError::Url(_)));
    }
}

use crate::{
    transport::{Admitted, CloseFrame, Connect, Inbound, Listener, MessageSink},
    AdmitError, ChannelRegistry,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, Stream, StreamExt,
};
use std::{
    convert::Infallible,
    future::Future,
    net::SocketAddr,
    pin::Pin,
    task::{ready, Context, Poll},
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        self,
        error::ProtocolError,
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        protocol::{frame::coding::CloseCode, CloseFrame as WsCloseFrame},
        Message,
    },
    WebSocketStream,
};
use tracing::{debug, debug_span, Instrument};

/// Sending half of a [`WebSocketStream`]
pub(crate) type SendHalf = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Receiving half of a [`WebSocketStream`].
pub(crate) type RecvHalf = SplitStream<WebSocketStream<TcpStream>>;

/// Errors accepting a websocket connection.
#[derive(Debug, thiserror::Error)]
pub enum WsAcceptError {
    /// Accepting the TCP connection failed.
    #[error("failed to accept TCP connection: {0}")]
    Io(#[from] std::io::Error),
    /// The upgrade request was rejected.
    #[error("rejected connection from {addr}: {source}")]
    Rejected {
        /// Address of the peer.
        addr: SocketAddr,
        /// Why it was rejected.
        source: AdmitError,
    },
    /// The websocket handshake failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),
    /// The handshake completed without consulting the registry.
    #[error("handshake completed without admission")]
    NotAdmitted,
}

/// Simple stream adapter for extracting text and close frames from a
/// [`WebSocketStream`].
#[derive(Debug)]
pub struct WsFrameStream {
    inner: RecvHalf,
    complete: bool,
}

impl From<RecvHalf> for WsFrameStream {
    fn from(inner: RecvHalf) -> Self {
        Self {
            inner,
            complete: false,
        }
    }
}

impl WsFrameStream {
    /// Handle an incoming [`Message`]
    fn handle(&self, message: Message) -> Option<Inbound> {
        match message {
            Message::Text(text) => Some(Inbound::Text(text.as_str().to_owned())),
            Message::Close(frame) => Some(Inbound::Close(frame.map(Into::into))),
            _ => None,
        }
    }
}

impl Stream for WsFrameStream {
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
    type Error = tungstenite::Error;

    async fn send_text(&mut self, text: String) -> Result<(), Self::Error> {
        self.send(Message::text(text)).await
    }

    async fn send_close(&mut self, frame: Option<CloseFrame>) -> Result<(), Self::Error> {
        match self.send(Message::Close(frame.map(Into::into))).await {
            // The peer closed first. tungstenite has queued the echo of its
            // frame, which goes out on the next flush.
            Err(tungstenite::Error::Protocol(ProtocolError::SendAfterClosing))
            | Err(tungstenite::Error::ConnectionClosed) => match self.flush().await {
                Err(tungstenite::Error::ConnectionClosed) => Ok(()),
                res => res,
            },
            res => res,
        }
    }
}

impl From<WsCloseFrame> for CloseFrame {
    fn from(frame: WsCloseFrame) -> Self {
        Self::new(frame.code.into(), frame.reason.as_str())
    }
}

impl From<CloseFrame> for WsCloseFrame {
    fn from(frame: CloseFrame) -> Self {
        Self {
            code: CloseCode::from(frame.code),
            reason: frame.reason.into(),
        }
    }
}

/// Build the HTTP response rejecting an upgrade.
fn reject(err: &AdmitError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    response
}

impl Listener for TcpListener {
    type Pending = (TcpStream, SocketAddr);

    type Sink = SendHalf;

    type Stream = WsFrameStream;

    type Error = WsAcceptError;

    async fn accept(&self) -> Result<Self::Pending, Self::Error> {
        Ok(self.accept().await?)
    }

    async fn handshake(
        (stream, addr): Self::Pending,
        registry: &ChannelRegistry,
    ) -> Result<Admitted<Self::Sink, Self::Stream>, Self::Error> {
        let span = debug_span!("ws connection", remote_addr = %addr);

        // Admission runs inside the handshake so that rejected requests get
        // an HTTP error instead of an upgraded socket.
        let mut admission = None;
        let callback = |req: &Request, resp: Response| match registry.admit(req.uri().query()) {
            Ok(registration) => {
                admission = Some(Ok(registration));
                Ok(resp)
            }
            Err(err) => {
                let rejection = reject(&err);
                admission = Some(Err(err));
                Err(rejection)
            }
        };

        let handshake = accept_hdr_async(stream, callback).instrument(span).await;

        match (admission, handshake) {
            (Some(Err(source)), _) => Err(WsAcceptError::Rejected { addr, source }),
            (_, Err(err)) => Err(err.into()),
            (Some(Ok(registration)), Ok(ws_stream)) => {
                let (sink, stream) = ws_stream.split();
                Ok(Admitted {
                    registration,
                    sink,
                    stream: stream.into(),
                })
            }
            (None, Ok(_)) => Err(WsAcceptError::NotAdmitted),
        }
    }
}

impl Connect for SocketAddr {
    type Listener = TcpListener;
    type Error = std::io::Error;

    fn make_listener(self) -> impl Future<Output = Result<Self::Listener, Self::Error>> + Send {
        TcpListener::bind(self)
    }
}

/// An already-bound listener. Useful when binding to port 0 and reading the
/// assigned address before serving.
impl Connect for TcpListener {
    type Listener = TcpListener;
    type Error = Infallible;

    async fn make_listener(self) -> Result<Self::Listener, Self::Error> {
        Ok(self)
    }
}

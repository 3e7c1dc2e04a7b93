use crate::{
    transport::{Admitted, CloseFrame, Inbound, MessageSink, MessageStream},
    ConnectionId, Direction, Registration, SessionError,
};
use core::fmt;
use serde_json::value::RawValue;
use tokio::select;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

/// Lifecycle of a [`Session`]. Admission (parsing the request and
/// registering) happens before the session exists, in
/// [`ChannelRegistry::admit`].
///
/// [`ChannelRegistry::admit`]: crate::ChannelRegistry::admit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Registered, loop not yet started.
    Registered,
    /// Moving data between the socket and the queue.
    Active,
    /// Deregistering and sending the final close frame.
    Closing,
    /// Terminal.
    Closed,
}

/// Why the active loop stopped.
#[derive(Debug)]
enum Termination {
    /// The peer started the close handshake.
    PeerClosed(Option<CloseFrame>),
    /// The inbound stream ended without a close frame.
    PeerGone,
    /// Sending to the peer failed.
    SendFailed,
    /// The server is shutting down.
    Shutdown,
}

/// The per-connection task. Moves messages between one connection and its
/// channel's queue, in the direction given by its [`Registration`].
pub(crate) struct Session<S, R> {
    conn_id: ConnectionId,
    registration: Registration,
    sink: S,
    stream: R,
    state: SessionState,
}

impl<S, R> fmt::Debug for Session<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("conn_id", &self.conn_id)
            .field("registration", &self.registration)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S, R> Session<S, R>
where
    S: MessageSink,
    R: MessageStream,
{
    /// Create a session for an admitted connection.
    pub(crate) fn new(conn_id: ConnectionId, admitted: Admitted<S, R>) -> Self {
        let Admitted {
            registration,
            sink,
            stream,
        } = admitted;
        Self {
            conn_id,
            registration,
            sink,
            stream,
            state: SessionState::Registered,
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Task future. Runs the direction-specific loop until the peer closes,
    /// the peer vanishes, or `shutdown` fires, then deregisters.
    ///
    /// A malformed payload from a writer terminates the session and is
    /// returned as an error, after the session has been closed.
    #[instrument(
        name = "Session",
        skip(self, shutdown),
        fields(
            conn_id = self.conn_id,
            channel = %self.registration.channel(),
            direction = %self.registration.direction(),
        )
    )]
    pub(crate) async fn task_future(mut self, shutdown: CancellationToken) -> Result<(), SessionError> {
        self.transition(SessionState::Active);

        let result = match self.registration.direction() {
            Direction::Read => self.read_loop(&shutdown).await,
            Direction::Write => self.write_loop(&shutdown).await,
        };

        self.close(result).await
    }

    /// Forward queued values to the peer.
    ///
    /// Waits on the queue, the shutdown signal and the peer at once, so a
    /// reader with nothing to read still notices both.
    async fn read_loop(&mut self, shutdown: &CancellationToken) -> Result<Termination, SessionError> {
        let queue = self.registration.queue().clone();

        loop {
            select! {
                biased;
                _ = shutdown.cancelled() => return Ok(Termination::Shutdown),
                inbound = self.stream.next() => match inbound {
                    None => return Ok(Termination::PeerGone),
                    Some(Inbound::Close(frame)) => return Ok(Termination::PeerClosed(frame)),
                    Some(Inbound::Text(_)) => trace!("ignoring text from reader"),
                },
                value = queue.pop() => {
                    trace!(data = value.get(), "got data");
                    if let Err(err) = self.sink.send_text(value.get().to_owned()).await {
                        debug!(%err, "failed to send message");
                        return Ok(Termination::SendFailed);
                    }
                }
            }
        }
    }

    /// Enqueue values received from the peer, in arrival order.
    async fn write_loop(&mut self, shutdown: &CancellationToken) -> Result<Termination, SessionError> {
        let queue = self.registration.queue().clone();

        loop {
            select! {
                biased;
                _ = shutdown.cancelled() => return Ok(Termination::Shutdown),
                inbound = self.stream.next() => match inbound {
                    None => return Ok(Termination::PeerGone),
                    Some(Inbound::Close(frame)) => return Ok(Termination::PeerClosed(frame)),
                    Some(Inbound::Text(text)) => {
                        let value =
                            RawValue::from_string(text).map_err(SessionError::MalformedPayload)?;
                        trace!(data = value.get(), "putting data");
                        queue.push(value);
                    }
                },
            }
        }
    }

    /// Passive close handshake. Deregisters, then echoes the peer's close
    /// code and reason back unchanged.
    pub(crate) async fn on_passive_close(&mut self, frame: Option<CloseFrame>) {
        match &frame {
            Some(frame) => debug!(%frame, "received close handshake"),
            None => debug!("received close handshake"),
        }
        self.registration.release();
        self.send_close(frame).await;
    }

    async fn send_close(&mut self, frame: Option<CloseFrame>) {
        // The transport may already have answered the handshake itself.
        if let Err(err) = self.sink.send_close(frame).await {
            trace!(%err, "failed to send close frame");
        }
    }

    async fn close(
        &mut self,
        result: Result<Termination, SessionError>,
    ) -> Result<(), SessionError> {
        self.transition(SessionState::Closing);

        let outcome = match result {
            Ok(Termination::PeerClosed(frame)) => {
                self.on_passive_close(frame).await;
                Ok(())
            }
            Ok(Termination::PeerGone) => {
                debug!("peer has gone away");
                Ok(())
            }
            Ok(Termination::SendFailed) => Ok(()),
            Ok(Termination::Shutdown) => {
                debug!("shutdown signal received");
                self.registration.release();
                self.send_close(Some(CloseFrame::going_away())).await;
                Ok(())
            }
            Err(err) => {
                warn!(%err, "terminating session");
                self.registration.release();
                self.send_close(Some(CloseFrame::invalid_payload(&err))).await;
                Err(err)
            }
        };

        self.registration.release();
        self.transition(SessionState::Closed);
        debug!("session closed");
        outcome
    }
}

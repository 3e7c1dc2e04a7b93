use core::fmt;

/// A websocket close code and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close code.
    pub code: u16,
    /// The close reason. May be empty.
    pub reason: String,
}

impl CloseFrame {
    /// The endpoint is going away, e.g. server shutdown.
    pub const GOING_AWAY: u16 = 1001;

    /// The endpoint received data inconsistent with the message type.
    pub const INVALID_PAYLOAD: u16 = 1007;

    /// Create a new close frame.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Close frame sent to peers when the server shuts down.
    pub fn going_away() -> Self {
        Self::new(Self::GOING_AWAY, "server shutting down")
    }

    /// Close frame sent to a writer that sent malformed JSON.
    pub fn invalid_payload(reason: impl fmt::Display) -> Self {
        Self::new(Self::INVALID_PAYLOAD, truncate_reason(reason.to_string()))
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.code)
    }
}

/// Close reasons are limited to 123 bytes on the wire.
fn truncate_reason(mut reason: String) -> String {
    const MAX: usize = 123;
    if reason.len() > MAX {
        let mut end = MAX;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

/// An item read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame.
    Text(String),
    /// The peer started the close handshake. A stream yields nothing after
    /// this item.
    Close(Option<CloseFrame>),
}

/// An item written to a connection. Used by the channel-backed
/// [`MessageSink`] implementation.
///
/// [`MessageSink`]: crate::transport::MessageSink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame.
    Text(String),
    /// A close frame.
    Close(Option<CloseFrame>),
}

use crate::RequestError;
use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt, str::FromStr};

/// Type alias for identifying connections.
pub type ConnectionId = u64;

/// Opaque identifier naming a channel. Typically a v4 UUID, but any string
/// is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a channel id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a fresh, random channel id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ChannelId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<uuid::Uuid> for ChannelId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id.to_string())
    }
}

/// The role a connection plays on its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Dequeues messages and forwards them to the peer. At most one per
    /// channel.
    Read,
    /// Accepts messages from the peer and enqueues them.
    Write,
}

impl Direction {
    /// The query-string spelling of the direction.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    /// True for [`Direction::Read`].
    pub const fn is_read(&self) -> bool {
        matches!(self, Self::Read)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            other => Err(RequestError::InvalidDirection(other.to_owned())),
        }
    }
}

/// The `(channel, direction)` pair a connection asks for in its upgrade
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRequest {
    /// The channel to join.
    pub channel: ChannelId,
    /// The role on that channel.
    pub direction: Direction,
}

impl ChannelRequest {
    /// Name of the query parameter carrying the channel id.
    pub const CHANNEL_PARAM: &'static str = "uuid";
    /// Name of the query parameter carrying the direction.
    pub const DIRECTION_PARAM: &'static str = "direction";

    /// Create a new request.
    pub const fn new(channel: ChannelId, direction: Direction) -> Self {
        Self { channel, direction }
    }

    /// Parse a request from the query portion of a URI (without the leading
    /// `?`). Values are percent-decoded. When a parameter is repeated, the
    /// last occurrence wins.
    pub fn from_query(query: Option<&str>) -> Result<Self, RequestError> {
        let mut channel = None;
        let mut direction = None;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                Self::CHANNEL_PARAM => channel = Some(value.into_owned()),
                Self::DIRECTION_PARAM => direction = Some(value.into_owned()),
                _ => {}
            }
        }

        let channel = channel
            .filter(|c| !c.is_empty())
            .ok_or(RequestError::MissingParam(Self::CHANNEL_PARAM))?;
        let direction = direction
            .ok_or(RequestError::MissingParam(Self::DIRECTION_PARAM))?
            .parse()?;

        Ok(Self::new(channel.into(), direction))
    }

    /// Render the request as a query string, the inverse of
    /// [`Self::from_query`].
    pub fn to_query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair(Self::CHANNEL_PARAM, self.channel.as_str())
            .append_pair(Self::DIRECTION_PARAM, self.direction.as_str())
            .finish()
    }
}

impl fmt::Display for ChannelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.channel, self.direction)
    }
}

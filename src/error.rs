use crate::ChannelId;

/// Error when parsing the channel request from an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// A required query parameter is absent or empty.
    #[error("missing query parameter: {0}")]
    MissingParam(&'static str),
    /// The direction is neither `read` nor `write`.
    #[error("invalid direction {0:?}, expected \"read\" or \"write\"")]
    InvalidDirection(String),
}

/// Errors raised by the [`ChannelRegistry`].
///
/// [`ChannelRegistry`]: crate::ChannelRegistry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// A reader is already registered on the channel.
    #[error("tried to start multiple readers for channel {0}")]
    DuplicateReader(ChannelId),
}

/// Errors that prevent a connection from being admitted to a channel. The
/// transport rejects the upgrade with [`Self::status_code`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmitError {
    /// The upgrade request was malformed.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// The registry refused the registration.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl AdmitError {
    /// HTTP status code used to reject the upgrade.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Request(_) => 400,
            Self::Channel(ChannelError::DuplicateReader(_)) => 409,
        }
    }
}

/// Errors that terminate an active session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A writer sent text that is not valid JSON.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            AdmitError::from(RequestError::MissingParam("uuid")).status_code(),
            400
        );
        assert_eq!(
            AdmitError::from(ChannelError::DuplicateReader("c1".into())).status_code(),
            409
        );
    }
}

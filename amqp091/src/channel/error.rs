use crate::CloseReason;

/// Errors of channel operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The channel was closed, by the application or by the broker
    #[error("Channel closed: {0}")]
    ChannelClosed(CloseReason),

    /// The connection carrying the channel was closed
    #[error("Connection closed: {0}")]
    ConnectionClosed(CloseReason),

    /// The request cannot be expressed on the wire, e.g. a frame above frame-max
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

impl Error {
    /// The reason the channel or connection closed
    pub fn close_reason(&self) -> Option<&CloseReason> {
        match self {
            Error::ChannelClosed(reason) | Error::ConnectionClosed(reason) => Some(reason),
            Error::ProtocolViolation(_) => None,
        }
    }
}

impl From<crate::frames::Error> for Error {
    fn from(err: crate::frames::Error) -> Self {
        Error::ProtocolViolation(err.to_string())
    }
}

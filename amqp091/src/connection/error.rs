//! Errors associated with the connection

use std::io;

use amqp091_types::definitions::MethodId;

use crate::{channel, frames, transport, CloseReason};

/// Errors of opening, using and closing a [`Connection`](super::Connection)
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// Codec error during the handshake
    #[error(transparent)]
    Frame(#[from] frames::Error),

    /// The broker went silent during the handshake
    #[error("Idle timeout")]
    IdleTimeout,

    /// Malformed url
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    /// A url that parses but cannot be used, e.g. a bad query parameter
    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    /// Only `amqp` is supported, TLS streams go through `open_with_stream`
    #[error("Unsupported url scheme {0:?}")]
    UnsupportedScheme(String),

    /// The broker does not offer the mechanism of the configured SASL profile
    #[error("SASL mechanism {mechanism} not offered by the broker ({offered})")]
    UnsupportedMechanism {
        /// Mechanism of the profile
        mechanism: &'static str,
        /// Mechanisms offered in `connection.start`
        offered: String,
    },

    /// The broker sent a method the handshake does not allow at this point
    #[error("Unexpected method {0} during handshake")]
    UnexpectedMethod(MethodId),

    /// The broker sent a content or heartbeat frame where a method was expected
    #[error("Unexpected frame of type {frame_type} on channel {channel} during handshake")]
    UnexpectedFrame {
        /// Channel of the frame
        channel: u16,
        /// Frame type octet
        frame_type: u8,
    },

    /// Every channel number up to channel-max is in use
    #[error("Channel limit of {0} exceeded")]
    ChannelLimitExceeded(u16),

    /// The connection is closed
    #[error("Connection closed: {0}")]
    Closed(CloseReason),

    /// Opening a channel failed
    #[error(transparent)]
    Channel(#[from] channel::Error),
}

impl From<transport::Error> for Error {
    fn from(err: transport::Error) -> Self {
        match err {
            transport::Error::Frame(frames::Error::Io(err)) => Self::Io(err),
            transport::Error::Frame(err) => Self::Frame(err),
            transport::Error::IdleTimeout => Self::IdleTimeout,
        }
    }
}

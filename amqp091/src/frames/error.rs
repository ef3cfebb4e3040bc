use std::io;

use amqp091_types::{
    constants::{FRAME_ERROR, NOT_IMPLEMENTED, SYNTAX_ERROR},
    definitions::Exception,
};

/// Errors raised by the frame codec. Apart from I/O they all mean the peer broke the framing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// Frame size including overhead exceeds the negotiated frame-max
    #[error("Frame of {size} bytes exceeds frame-max {max}")]
    FrameTooLarge {
        /// Size of the whole frame
        size: usize,
        /// Negotiated frame-max
        max: usize,
    },

    /// The octet after the payload was not 0xCE
    #[error("Expected frame-end octet, found {0:#04x}")]
    MissingFrameEnd(u8),

    /// Frame type octet is not method, header, body or heartbeat
    #[error("Unknown frame type {0}")]
    UnknownFrameType(u8),

    /// The peer answered with a protocol header, it does not speak 0-9-1
    #[error("Server rejected protocol header, it offered {0:?}")]
    ProtocolHeaderMismatch([u8; 8]),

    /// Payload could not be decoded
    #[error(transparent)]
    Decode(#[from] amqp091_types::Error),
}

impl Error {
    /// The exception to close the connection with, `None` if the transport itself is gone
    pub fn to_exception(&self) -> Option<Exception> {
        let code = match self {
            Error::Io(_) | Error::ProtocolHeaderMismatch(_) => return None,
            Error::FrameTooLarge { .. } | Error::MissingFrameEnd(_) | Error::UnknownFrameType(_) => {
                FRAME_ERROR
            }
            Error::Decode(amqp091_types::Error::UnknownMethod { .. }) => NOT_IMPLEMENTED,
            Error::Decode(_) => SYNTAX_ERROR,
        };
        Some(Exception::new(code, self.to_string()))
    }
}

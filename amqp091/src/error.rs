//! Reasons a connection or channel stopped

use std::{fmt, io, sync::Arc};

use amqp091_types::definitions::Exception;

/// Why a connection or a channel is no longer usable.
///
/// The reason is cloned into every waiter that gets rejected when the scope closes.
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// Closed by the application
    Requested,

    /// Closed by this client because of the given exception, e.g. a protocol violation
    Local(Exception),

    /// Closed by the broker with the given exception
    Remote(Exception),

    /// The transport failed
    Io(Arc<io::Error>),

    /// No frame arrived within the negotiated heartbeat interval
    HeartbeatTimeout,
}

impl CloseReason {
    /// The exception carried by a local or remote close
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            CloseReason::Local(exception) | CloseReason::Remote(exception) => Some(exception),
            _ => None,
        }
    }

    /// Whether the scope was closed on purpose with a success reply code
    pub fn is_graceful(&self) -> bool {
        match self {
            CloseReason::Requested => true,
            CloseReason::Local(exception) | CloseReason::Remote(exception) => {
                exception.is_success()
            }
            CloseReason::Io(_) | CloseReason::HeartbeatTimeout => false,
        }
    }

    pub(crate) fn engine_stopped() -> Self {
        CloseReason::Io(Arc::new(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "connection engine stopped",
        )))
    }
}

impl From<io::Error> for CloseReason {
    fn from(err: io::Error) -> Self {
        CloseReason::Io(Arc::new(err))
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Requested => write!(f, "closed by application"),
            CloseReason::Local(exception) => write!(f, "closed locally: {}", exception),
            CloseReason::Remote(exception) => write!(f, "closed by broker: {}", exception),
            CloseReason::Io(err) => write!(f, "transport failed: {}", err),
            CloseReason::HeartbeatTimeout => write!(f, "missed heartbeats from broker"),
        }
    }
}

use crate::frames;

/// Transport error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Codec or I/O error
    #[error(transparent)]
    Frame(#[from] frames::Error),

    /// Nothing was received within the heartbeat interval
    #[error("Idle timeout")]
    IdleTimeout,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Frame(frames::Error::Io(err))
    }
}

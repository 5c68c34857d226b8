use std::io;

use thiserror::Error;

/// How a completed read ended.
///
/// Mirrors the VISA completion codes `VI_SUCCESS`, `VI_SUCCESS_TERM_CHAR`
/// and `VI_SUCCESS_MAX_CNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The device finished sending before either condition below applied.
    Complete,
    /// The read ended on the device's end-of-message indicator or on the
    /// termination character.
    TermChar,
    /// The caller's buffer filled up before any terminator was seen.
    MaxCount,
}

/// Error set surfaced by every operation of the core.
///
/// This is a closed taxonomy: the C ABI layer maps each variant onto the
/// corresponding `VI_ERROR_*` status code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid session or object reference")]
    InvalidObject,
    #[error("invalid resource name: {0}")]
    InvalidResourceName(String),
    #[error("resource not found")]
    ResourceNotFound,
    #[error("resource is locked")]
    ResourceLocked,
    #[error("timeout expired")]
    Timeout,
    #[error("i/o error: {0}")]
    Io(String),
    #[error("connection lost")]
    ConnectionLost,
    #[error("insufficient resources")]
    Alloc,
    #[error("operation not supported")]
    NotSupported,
    #[error("attribute not supported")]
    UnsupportedAttribute,
}

impl Error {
    /// Protocol violation or wire corruption on an otherwise healthy link.
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Io(msg.into())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => Error::ConnectionLost,
            _ => Error::Io(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeout_kinds_map_to_timeout() {
        let e: Error = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert!(matches!(e, Error::Timeout));
        let e: Error = io::Error::from(io::ErrorKind::TimedOut).into();
        assert!(matches!(e, Error::Timeout));
    }

    #[test]
    fn peer_close_maps_to_connection_lost() {
        let e: Error = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(e, Error::ConnectionLost));
    }
}

//! Runtime error types.

use std::fmt;

use crate::{server_error::ServerError as DriverError, storage::StoreError};

/// Errors raised while starting or running the QUIC server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (bad bind address, unreadable TLS files, bad
    /// `--room` seed).
    ///
    /// Fatal at startup.
    Config(String),

    /// Transport/network error (endpoint, handshake or stream failure).
    ///
    /// Fatal for the affected connection only, unless raised while binding.
    Transport(String),

    /// Malformed frame on a stream. The stream is dropped; the session
    /// stays.
    Protocol(String),

    /// Room store could not be opened or seeded.
    Store(StoreError),

    /// Unexpected state. Indicates a bug.
    Internal(String),

    /// Error from `ServerDriver` processing.
    Driver(DriverError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Store(err) => write!(f, "store error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Driver(err) => write!(f, "driver error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DriverError> for ServerError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<vestibule_proto::ProtocolError> for ServerError {
    fn from(err: vestibule_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

//! Driver error types.
//!
//! Only failures the driver cannot turn into actions surface here. Store and
//! coordinator failures are logged at the handler boundary instead.

use std::fmt;

use crate::{registry::RegistryError, storage::StoreError};

/// Errors returned by `ServerDriver::process_event`.
#[derive(Debug)]
pub enum ServerError {
    /// Session not found in registry.
    ///
    /// A frame arrived for a session the driver never accepted or already
    /// released. The runtime should drop the frame.
    SessionNotFound(u64),

    /// Session registry rejected an operation.
    Registry(RegistryError),

    /// Store operation failed outside a request handler.
    Store(StoreError),

    /// Frame encoding/decoding error.
    Protocol(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::Registry(err) => write!(f, "registry error: {err}"),
            Self::Store(err) => write!(f, "store error: {err}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RegistryError> for ServerError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::SessionNotFound(id) => Self::SessionNotFound(id),
            other => Self::Registry(other),
        }
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

#[cfg(test)]
mod tests {
    use vestibule_proto::RoomId;

    use super::*;

    #[test]
    fn server_error_display() {
        let err = ServerError::SessionNotFound(42);
        assert_eq!(err.to_string(), "session not found: 42");

        let err = ServerError::from(StoreError::RoomNotFound(RoomId::from("r2")));
        assert_eq!(err.to_string(), "store error: room not found: r2");
    }

    #[test]
    fn missing_session_maps_to_session_not_found() {
        let err = ServerError::from(RegistryError::SessionNotFound(7));
        assert!(matches!(err, ServerError::SessionNotFound(7)));
    }
}

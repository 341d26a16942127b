use thiserror::Error;
use vestibule_core::RequestError;
use vestibule_proto::{RequestStatus, RoomId, UserId};

/// Room store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Referenced room does not exist
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    /// No join request at `(room_id, requester_id)`
    #[error("join request not found: room {room_id}, requester {requester_id}")]
    RequestNotFound {
        /// Room part of the key
        room_id: RoomId,
        /// Requester part of the key
        requester_id: UserId,
    },

    /// Request already holds a different terminal status
    #[error("join request already {current}, cannot become {attempted}")]
    AlreadyResolved {
        /// Stored status
        current: RequestStatus,
        /// Status the caller tried to apply
        attempted: RequestStatus,
    },

    /// Status update must name a terminal status
    #[error("invalid status update: {0}")]
    InvalidStatus(RequestStatus),

    /// Backend failed or timed out. Transient.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the operation may succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Whether the error means the referenced record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RoomNotFound(_) | Self::RequestNotFound { .. })
    }
}

impl From<RequestError> for StoreError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::AlreadyResolved { current, attempted } => {
                Self::AlreadyResolved { current, attempted }
            },
            RequestError::NotTerminal(status) => Self::InvalidStatus(status),
        }
    }
}

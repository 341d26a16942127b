//! Errors raised by the join request state machine.

use thiserror::Error;
use vestibule_proto::RequestStatus;

/// Invalid join request transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// Request already reached a different terminal status
    #[error("request already {current}, cannot become {attempted}")]
    AlreadyResolved {
        /// Status stored on the request
        current: RequestStatus,
        /// Status the caller tried to apply
        attempted: RequestStatus,
    },

    /// Resolution must name a terminal status
    #[error("cannot resolve a request to {0}")]
    NotTerminal(RequestStatus),
}

//! Rooms and join requests.
//!
//! A [`Room`] has a creator, who holds approval authority, and a participant
//! set that only grows through accepted requests. A [`JoinRequest`] is keyed
//! by `(room_id, requester_id)` and moves from `pending` to a terminal status
//! exactly once.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vestibule_proto::{RequestStatus, RoomId, UserId};

use crate::error::RequestError;

/// Persisted room record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Room identifier
    pub room_id: RoomId,
    /// User who created the room and approves join requests
    pub creator_id: UserId,
    /// Admitted users. Never contains duplicates, never shrinks.
    pub participants: BTreeSet<UserId>,
}

impl Room {
    /// New room with no admitted participants.
    pub fn new(room_id: impl Into<RoomId>, creator_id: impl Into<UserId>) -> Self {
        Self { room_id: room_id.into(), creator_id: creator_id.into(), participants: BTreeSet::new() }
    }

    /// Whether `user` is the creator or an admitted participant.
    ///
    /// The creator is an implicit member even when absent from
    /// `participants`.
    pub fn is_member(&self, user: &UserId) -> bool {
        self.creator_id == *user || self.participants.contains(user)
    }

    /// Set-union insert. Returns `false` if `user` was already a participant.
    pub fn add_participant(&mut self, user: UserId) -> bool {
        self.participants.insert(user)
    }
}

/// Persisted join request record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Room the requester asked to join
    pub room_id: RoomId,
    /// User asking to join
    pub requester_id: UserId,
    /// Lifecycle status
    pub status: RequestStatus,
    /// Server-assigned creation time (Unix millis)
    pub requested_at: u64,
}

impl JoinRequest {
    /// Fresh `pending` request stamped with `requested_at`.
    pub fn pending(room_id: RoomId, requester_id: UserId, requested_at: u64) -> Self {
        Self { room_id, requester_id, status: RequestStatus::Pending, requested_at }
    }

    /// Whether the request still awaits a decision.
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Apply a creator's decision.
    ///
    /// `pending → accepted | rejected` succeeds. Re-applying the status the
    /// request already holds succeeds without change, so a repeated response
    /// is harmless.
    ///
    /// # Errors
    ///
    /// - `RequestError::NotTerminal` if `status` is `pending`
    /// - `RequestError::AlreadyResolved` if the request holds the other
    ///   terminal status
    pub fn resolve(&mut self, status: RequestStatus) -> Result<(), RequestError> {
        if !status.is_terminal() {
            return Err(RequestError::NotTerminal(status));
        }

        match self.status {
            RequestStatus::Pending => {
                self.status = status;
                Ok(())
            },
            current if current == status => Ok(()),
            current => Err(RequestError::AlreadyResolved { current, attempted: status }),
        }
    }
}

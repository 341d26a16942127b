//! Join request coordination.
//!
//! Per `(room, requester)` key a request moves through
//! `NoRequest → Pending → {Accepted | Rejected}`. The coordinator persists
//! each step through the [`RoomStore`] and says who must be told about it;
//! delivery is the router's job.
//!
//! Both operations return typed results. The driver logs failures at its
//! boundary and never reports them back to the client.

use thiserror::Error;
use vestibule_core::{Environment, JoinRequest};
use vestibule_proto::{
    Payload, RequestStatus, RoomId, UserId,
    payloads::request::{RequestReceived, RequestResponse},
};

use crate::storage::{RoomStore, StoreError};

/// What to do when a user asks again while their request is still pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReRequestPolicy {
    /// Replace the pending request (new timestamp) and notify the creator
    /// again. Last write wins.
    #[default]
    Overwrite,
    /// Refuse with `CoordinatorError::AlreadyPending`, leaving the original
    /// request untouched.
    RejectWhilePending,
}

/// Coordinator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Store lookup or write failed, including the not-found cases
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A pending request already exists and the policy forbids replacing it
    #[error("request already pending: room {room_id}, requester {requester_id}")]
    AlreadyPending {
        /// Room of the pending request
        room_id: RoomId,
        /// Requester of the pending request
        requester_id: UserId,
    },
}

impl CoordinatorError {
    /// Whether the referenced room or request does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}

/// A payload addressed to every session of one user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// User whose address receives the payload
    pub recipient: UserId,
    /// Event to deliver
    pub payload: Payload,
}

/// Join request state machine over a room store.
#[derive(Debug, Clone)]
pub struct RequestCoordinator<S, E> {
    store: S,
    env: E,
    policy: ReRequestPolicy,
}

impl<S, E> RequestCoordinator<S, E>
where
    S: RoomStore,
    E: Environment,
{
    /// Create a coordinator over `store`.
    pub fn new(store: S, env: E, policy: ReRequestPolicy) -> Self {
        Self { store, env, policy }
    }

    /// Record a pending request and address `request:received` to the room's
    /// creator.
    ///
    /// If the room does not exist nothing is written.
    ///
    /// # Errors
    ///
    /// - `StoreError::RoomNotFound` if the room does not exist
    /// - `CoordinatorError::AlreadyPending` under
    ///   `ReRequestPolicy::RejectWhilePending`
    /// - `StoreError::Unavailable` if any store call fails
    pub async fn request_join(
        &self,
        room_id: &RoomId,
        requester_id: &UserId,
    ) -> Result<Notification, CoordinatorError> {
        let room = self
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| StoreError::RoomNotFound(room_id.clone()))?;

        if self.policy == ReRequestPolicy::RejectWhilePending {
            let existing = self.store.get_join_request(room_id, requester_id).await?;
            if existing.is_some_and(|r| r.is_pending()) {
                return Err(CoordinatorError::AlreadyPending {
                    room_id: room_id.clone(),
                    requester_id: requester_id.clone(),
                });
            }
        }

        let request =
            JoinRequest::pending(room_id.clone(), requester_id.clone(), self.env.wall_clock_millis());
        self.store.put_join_request(&request).await?;

        Ok(Notification {
            recipient: room.creator_id,
            payload: Payload::RequestReceived(RequestReceived {
                chat_id: room_id.clone(),
                requester_id: requester_id.clone(),
            }),
        })
    }

    /// Resolve a request and address `request:response` to the requester.
    ///
    /// On acceptance the requester joins the room's participant set. A
    /// repeated identical decision succeeds again and produces another
    /// notification; the participant set is unchanged.
    ///
    /// # Errors
    ///
    /// - `StoreError::RequestNotFound` if no request exists at the key
    /// - `StoreError::AlreadyResolved` if the opposite decision was recorded
    /// - `StoreError::RoomNotFound` if the room vanished before the
    ///   participant could be added
    /// - `StoreError::Unavailable` if any store call fails
    pub async fn respond_to_request(
        &self,
        room_id: &RoomId,
        requester_id: &UserId,
        accept: bool,
    ) -> Result<Notification, CoordinatorError> {
        let status = RequestStatus::from_decision(accept);
        self.store.update_join_request_status(room_id, requester_id, status).await?;

        if status == RequestStatus::Accepted {
            self.store.add_participant(room_id, requester_id).await?;
        }

        Ok(Notification {
            recipient: requester_id.clone(),
            payload: Payload::RequestResponse(RequestResponse { chat_id: room_id.clone(), status }),
        })
    }

    /// Whether `user` may enter the room's group: the room exists and `user`
    /// is its creator or an accepted participant.
    ///
    /// # Errors
    ///
    /// - `StoreError::Unavailable` if the room lookup fails
    pub async fn is_member(&self, room_id: &RoomId, user: &UserId) -> Result<bool, CoordinatorError> {
        let room = self.store.get_room(room_id).await?;
        Ok(room.is_some_and(|r| r.is_member(user)))
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

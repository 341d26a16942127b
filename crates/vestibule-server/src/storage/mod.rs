//! Room store abstraction.
//!
//! Durable record of rooms (creator, participants) and join requests keyed by
//! `(room_id, requester_id)`. Every call is async and may fail with
//! [`StoreError::Unavailable`]; callers must survive that.
//!
//! Logical schema:
//!
//! - `rooms[room_id] = {creatorId, participants}`
//! - `join_requests[room_id][requester_id] = {status, requestedAt}`

mod chaotic;
mod error;
mod memory;
mod redb;

use async_trait::async_trait;
pub use chaotic::ChaoticStore;
pub use error::StoreError;
pub use memory::MemoryStore;
use vestibule_core::{JoinRequest, Room};
use vestibule_proto::{RequestStatus, RoomId, UserId};

pub use self::redb::RedbStore;

/// Persistence interface consumed by the request coordinator.
///
/// Implementations share state internally (`Arc`), so clones see the same
/// data.
#[async_trait]
pub trait RoomStore: Clone + Send + Sync + 'static {
    /// Room record. `None` if the room does not exist.
    async fn get_room(&self, room_id: &RoomId) -> Result<Option<Room>, StoreError>;

    /// Create a room. Idempotent: an existing room is left untouched.
    ///
    /// Returns `true` if the room was created by this call.
    async fn create_room(&self, room: &Room) -> Result<bool, StoreError>;

    /// Create or overwrite the request at `(request.room_id,
    /// request.requester_id)`.
    ///
    /// Unconditional write: a second request by the same user replaces the
    /// first, so there is never more than one record per key.
    async fn put_join_request(&self, request: &JoinRequest) -> Result<(), StoreError>;

    /// Request at `(room_id, requester_id)`. `None` if never created.
    async fn get_join_request(
        &self,
        room_id: &RoomId,
        requester_id: &UserId,
    ) -> Result<Option<JoinRequest>, StoreError>;

    /// All requests recorded for a room, resolved ones included, ordered by
    /// requester.
    async fn list_join_requests(&self, room_id: &RoomId) -> Result<Vec<JoinRequest>, StoreError>;

    /// Move a request to a terminal status in one conditional write.
    ///
    /// Re-applying the status the request already holds succeeds. Returns the
    /// stored record after the update.
    ///
    /// # Errors
    ///
    /// - `StoreError::RequestNotFound` if no request exists at the key
    /// - `StoreError::AlreadyResolved` if it holds the other terminal status
    /// - `StoreError::InvalidStatus` if `status` is `pending`
    async fn update_join_request_status(
        &self,
        room_id: &RoomId,
        requester_id: &UserId,
        status: RequestStatus,
    ) -> Result<JoinRequest, StoreError>;

    /// Set-union insert into the room's participants.
    ///
    /// Returns `false` if `user_id` was already a participant.
    ///
    /// # Errors
    ///
    /// - `StoreError::RoomNotFound` if the room does not exist
    async fn add_participant(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, StoreError>;
}

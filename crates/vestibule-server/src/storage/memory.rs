#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use vestibule_core::{JoinRequest, Room};
use vestibule_proto::{RequestStatus, RoomId, UserId};

use super::{RoomStore, StoreError};

/// In-memory room store for tests and single-process deployments.
///
/// All state sits behind one `Arc<Mutex<>>`. The lock is never held across
/// an `.await`. A poisoned lock surfaces as `StoreError::Unavailable`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    rooms: HashMap<RoomId, Room>,
    /// Ordered so a room's requests form one contiguous range
    requests: BTreeMap<(RoomId, UserId), JoinRequest>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    /// Number of stored rooms.
    pub fn room_count(&self) -> usize {
        self.lock().map_or(0, |inner| inner.rooms.len())
    }

    /// Number of stored join requests across all rooms.
    pub fn request_count(&self) -> usize {
        self.lock().map_or(0, |inner| inner.requests.len())
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn get_room(&self, room_id: &RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.lock()?.rooms.get(room_id).cloned())
    }

    async fn create_room(&self, room: &Room) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if inner.rooms.contains_key(&room.room_id) {
            return Ok(false);
        }
        inner.rooms.insert(room.room_id.clone(), room.clone());
        Ok(true)
    }

    async fn put_join_request(&self, request: &JoinRequest) -> Result<(), StoreError> {
        let key = (request.room_id.clone(), request.requester_id.clone());
        self.lock()?.requests.insert(key, request.clone());
        Ok(())
    }

    async fn get_join_request(
        &self,
        room_id: &RoomId,
        requester_id: &UserId,
    ) -> Result<Option<JoinRequest>, StoreError> {
        let key = (room_id.clone(), requester_id.clone());
        Ok(self.lock()?.requests.get(&key).cloned())
    }

    async fn list_join_requests(&self, room_id: &RoomId) -> Result<Vec<JoinRequest>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .requests
            .range((room_id.clone(), UserId::new(""))..)
            .take_while(|((room, _), _)| room == room_id)
            .map(|(_, request)| request.clone())
            .collect())
    }

    async fn update_join_request_status(
        &self,
        room_id: &RoomId,
        requester_id: &UserId,
        status: RequestStatus,
    ) -> Result<JoinRequest, StoreError> {
        let key = (room_id.clone(), requester_id.clone());
        let mut inner = self.lock()?;

        let request = inner.requests.get_mut(&key).ok_or_else(|| StoreError::RequestNotFound {
            room_id: room_id.clone(),
            requester_id: requester_id.clone(),
        })?;

        request.resolve(status)?;
        Ok(request.clone())
    }

    async fn add_participant(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let room =
            inner.rooms.get_mut(room_id).ok_or_else(|| StoreError::RoomNotFound(room_id.clone()))?;
        Ok(room.add_participant(user_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(room: &str, user: &str, at: u64) -> JoinRequest {
        JoinRequest::pending(RoomId::from(room), UserId::from(user), at)
    }

    #[tokio::test]
    async fn create_room_is_idempotent() {
        let store = MemoryStore::new();
        let mut room = Room::new("r1", "alice");

        assert!(store.create_room(&room).await.unwrap());

        room.creator_id = UserId::from("mallory");
        assert!(!store.create_room(&room).await.unwrap());

        let stored = store.get_room(&RoomId::from("r1")).await.unwrap().unwrap();
        assert_eq!(stored.creator_id, UserId::from("alice"));
    }

    #[tokio::test]
    async fn put_overwrites_same_key() {
        let store = MemoryStore::new();

        store.put_join_request(&request("r1", "bob", 1)).await.unwrap();
        store.put_join_request(&request("r1", "bob", 2)).await.unwrap();

        assert_eq!(store.request_count(), 1);
        let stored = store
            .get_join_request(&RoomId::from("r1"), &UserId::from("bob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.requested_at, 2);
    }

    #[tokio::test]
    async fn list_is_scoped_to_room() {
        let store = MemoryStore::new();

        store.put_join_request(&request("r1", "carol", 1)).await.unwrap();
        store.put_join_request(&request("r1", "bob", 2)).await.unwrap();
        store.put_join_request(&request("r2", "bob", 3)).await.unwrap();
        store.put_join_request(&request("r10", "dave", 4)).await.unwrap();

        let listed = store.list_join_requests(&RoomId::from("r1")).await.unwrap();
        let requesters: Vec<_> = listed.iter().map(|r| r.requester_id.as_str()).collect();
        assert_eq!(requesters, vec!["bob", "carol"]);
    }

    #[tokio::test]
    async fn update_missing_request_is_not_found() {
        let store = MemoryStore::new();

        let err = store
            .update_join_request_status(
                &RoomId::from("r1"),
                &UserId::from("dave"),
                RequestStatus::Accepted,
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn update_enforces_single_resolution() {
        let store = MemoryStore::new();
        let (room, user) = (RoomId::from("r1"), UserId::from("bob"));
        store.put_join_request(&request("r1", "bob", 1)).await.unwrap();

        let updated =
            store.update_join_request_status(&room, &user, RequestStatus::Rejected).await.unwrap();
        assert_eq!(updated.status, RequestStatus::Rejected);

        store.update_join_request_status(&room, &user, RequestStatus::Rejected).await.unwrap();

        let err = store
            .update_join_request_status(&room, &user, RequestStatus::Accepted)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::AlreadyResolved {
            current: RequestStatus::Rejected,
            attempted: RequestStatus::Accepted,
        });
    }

    #[tokio::test]
    async fn add_participant_requires_room() {
        let store = MemoryStore::new();
        let err = store.add_participant(&RoomId::from("r9"), &UserId::from("bob")).await.unwrap_err();
        assert_eq!(err, StoreError::RoomNotFound(RoomId::from("r9")));

        store.create_room(&Room::new("r9", "alice")).await.unwrap();
        assert!(store.add_participant(&RoomId::from("r9"), &UserId::from("bob")).await.unwrap());
        assert!(!store.add_participant(&RoomId::from("r9"), &UserId::from("bob")).await.unwrap());
    }
}

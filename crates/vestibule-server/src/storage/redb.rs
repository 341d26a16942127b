//! Redb-backed durable room store.
//!
//! Uses Redb's ACID transactions, so rooms and join requests survive
//! restarts. Every operation is one transaction run on Tokio's blocking pool.

use std::{fmt::Display, path::Path, sync::Arc};

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};
use vestibule_core::{JoinRequest, Room};
use vestibule_proto::{RequestStatus, RoomId, UserId};

use super::{RoomStore, StoreError};

/// Table: rooms
/// Key: room id bytes
/// Value: CBOR-encoded Room
const ROOMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("rooms");

/// Table: join_requests
/// Key: room key prefix (u32 BE length + room id bytes) + requester id bytes
/// Value: CBOR-encoded JoinRequest
const JOIN_REQUESTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("join_requests");

/// Durable room store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the database cannot be opened or
    /// created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(unavailable)?;

        let txn = db.begin_write().map_err(unavailable)?;
        {
            let _ = txn.open_table(ROOMS).map_err(unavailable)?;
            let _ = txn.open_table(JOIN_REQUESTS).map_err(unavailable)?;
        }
        txn.commit().map_err(unavailable)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Run a blocking database operation off the async executor.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db)).await.map_err(unavailable)?
    }
}

#[async_trait]
impl RoomStore for RedbStore {
    async fn get_room(&self, room_id: &RoomId) -> Result<Option<Room>, StoreError> {
        let key = room_id.as_str().as_bytes().to_vec();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(unavailable)?;
            let table = txn.open_table(ROOMS).map_err(unavailable)?;
            match table.get(key.as_slice()).map_err(unavailable)? {
                Some(value) => decode(value.value()).map(Some),
                None => Ok(None),
            }
        })
        .await
    }

    async fn create_room(&self, room: &Room) -> Result<bool, StoreError> {
        let key = room.room_id.as_str().as_bytes().to_vec();
        let bytes = encode(room)?;
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable)?;
            let created = {
                let mut table = txn.open_table(ROOMS).map_err(unavailable)?;
                let exists = table.get(key.as_slice()).map_err(unavailable)?.is_some();
                if !exists {
                    table.insert(key.as_slice(), bytes.as_slice()).map_err(unavailable)?;
                }
                !exists
            };
            txn.commit().map_err(unavailable)?;
            Ok(created)
        })
        .await
    }

    async fn put_join_request(&self, request: &JoinRequest) -> Result<(), StoreError> {
        let key = request_key(&request.room_id, &request.requester_id);
        let bytes = encode(request)?;
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable)?;
            {
                let mut table = txn.open_table(JOIN_REQUESTS).map_err(unavailable)?;
                table.insert(key.as_slice(), bytes.as_slice()).map_err(unavailable)?;
            }
            txn.commit().map_err(unavailable)
        })
        .await
    }

    async fn get_join_request(
        &self,
        room_id: &RoomId,
        requester_id: &UserId,
    ) -> Result<Option<JoinRequest>, StoreError> {
        let key = request_key(room_id, requester_id);
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(unavailable)?;
            let table = txn.open_table(JOIN_REQUESTS).map_err(unavailable)?;
            match table.get(key.as_slice()).map_err(unavailable)? {
                Some(value) => decode(value.value()).map(Some),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_join_requests(&self, room_id: &RoomId) -> Result<Vec<JoinRequest>, StoreError> {
        let prefix = room_prefix(room_id);
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(unavailable)?;
            let table = txn.open_table(JOIN_REQUESTS).map_err(unavailable)?;

            let mut requests = Vec::new();
            for entry in table.range(prefix.as_slice()..).map_err(unavailable)? {
                let (key, value) = entry.map_err(unavailable)?;
                if !key.value().starts_with(&prefix) {
                    break;
                }
                requests.push(decode(value.value())?);
            }
            Ok(requests)
        })
        .await
    }

    async fn update_join_request_status(
        &self,
        room_id: &RoomId,
        requester_id: &UserId,
        status: RequestStatus,
    ) -> Result<JoinRequest, StoreError> {
        let key = request_key(room_id, requester_id);
        let (room_id, requester_id) = (room_id.clone(), requester_id.clone());
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable)?;
            let updated = {
                let mut table = txn.open_table(JOIN_REQUESTS).map_err(unavailable)?;

                let stored: Option<JoinRequest> = match table.get(key.as_slice()).map_err(unavailable)? {
                    Some(value) => Some(decode(value.value())?),
                    None => None,
                };
                let mut request =
                    stored.ok_or(StoreError::RequestNotFound { room_id, requester_id })?;

                request.resolve(status)?;
                let bytes = encode(&request)?;
                table.insert(key.as_slice(), bytes.as_slice()).map_err(unavailable)?;
                request
            };
            txn.commit().map_err(unavailable)?;
            Ok(updated)
        })
        .await
    }

    async fn add_participant(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, StoreError> {
        let key = room_id.as_str().as_bytes().to_vec();
        let (room_id, user_id) = (room_id.clone(), user_id.clone());
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(unavailable)?;
            let added = {
                let mut table = txn.open_table(ROOMS).map_err(unavailable)?;

                let stored: Option<Room> = match table.get(key.as_slice()).map_err(unavailable)? {
                    Some(value) => Some(decode(value.value())?),
                    None => None,
                };
                let mut room = stored.ok_or(StoreError::RoomNotFound(room_id))?;

                let added = room.add_participant(user_id);
                if added {
                    let bytes = encode(&room)?;
                    table.insert(key.as_slice(), bytes.as_slice()).map_err(unavailable)?;
                }
                added
            };
            txn.commit().map_err(unavailable)?;
            Ok(added)
        })
        .await
    }
}

/// Length-prefixed room id, so no room's prefix is a prefix of another's.
fn room_prefix(room_id: &RoomId) -> Vec<u8> {
    let bytes = room_id.as_str().as_bytes();
    let mut key = Vec::with_capacity(4 + bytes.len());
    key.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    key.extend_from_slice(bytes);
    key
}

fn request_key(room_id: &RoomId, requester_id: &UserId) -> Vec<u8> {
    let mut key = room_prefix(room_id);
    key.extend_from_slice(requester_id.as_str().as_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn unavailable(err: impl Display) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

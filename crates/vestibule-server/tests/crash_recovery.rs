//! Crash recovery tests for `RedbStore`.
//!
//! Rooms and join requests must survive a close/reopen cycle, so a restarted
//! relay can still resolve requests made before the restart.

mod common;

use common::{EPOCH_MILLIS, Relay, deliveries};
use tempfile::tempdir;
use vestibule_core::{JoinRequest, Room};
use vestibule_proto::{
    Payload, RequestStatus, RoomId, UserId, payloads::request::RequestResponse,
};
use vestibule_server::{DriverConfig, RedbStore, RoomStore, seed_rooms};

#[tokio::test]
async fn rooms_and_requests_survive_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("vestibule.redb");
    let room = RoomId::from("r1");

    {
        let store = RedbStore::open(&db_path).unwrap();
        store.create_room(&Room::new("r1", "alice")).await.unwrap();
        for (user, at) in [("bob", 10), ("carol", 20), ("dave", 30)] {
            store.put_join_request(&JoinRequest::pending(room.clone(), UserId::from(user), at)).await.unwrap();
        }
        store
            .update_join_request_status(&room, &UserId::from("carol"), RequestStatus::Accepted)
            .await
            .unwrap();
        store.add_participant(&room, &UserId::from("carol")).await.unwrap();
    }

    let store = RedbStore::open(&db_path).unwrap();

    let stored = store.get_room(&room).await.unwrap().unwrap();
    assert_eq!(stored.creator_id, UserId::from("alice"));
    assert!(stored.participants.contains(&UserId::from("carol")));

    let requests = store.list_join_requests(&room).await.unwrap();
    let summary: Vec<_> = requests
        .iter()
        .map(|r| (r.requester_id.as_str(), r.status, r.requested_at))
        .collect();
    assert_eq!(summary, vec![
        ("bob", RequestStatus::Pending, 10),
        ("carol", RequestStatus::Accepted, 20),
        ("dave", RequestStatus::Pending, 30),
    ]);
}

#[tokio::test]
async fn resolved_status_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("vestibule.redb");
    let (room, bob) = (RoomId::from("r1"), UserId::from("bob"));

    {
        let store = RedbStore::open(&db_path).unwrap();
        store.create_room(&Room::new("r1", "alice")).await.unwrap();
        store.put_join_request(&JoinRequest::pending(room.clone(), bob.clone(), 1)).await.unwrap();
        store.update_join_request_status(&room, &bob, RequestStatus::Rejected).await.unwrap();
    }

    let store = RedbStore::open(&db_path).unwrap();
    let err = store.update_join_request_status(&room, &bob, RequestStatus::Accepted).await.unwrap_err();
    assert!(err.to_string().contains("cannot become accepted"), "{err}");
}

#[tokio::test]
async fn seeding_twice_keeps_existing_participants() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("vestibule.redb");
    let seeds = vec![Room::new("r1", "alice"), Room::new("r2", "erin")];

    {
        let store = RedbStore::open(&db_path).unwrap();
        assert_eq!(seed_rooms(&store, &seeds).await.unwrap(), 2);
        store.add_participant(&RoomId::from("r1"), &UserId::from("bob")).await.unwrap();
    }

    let store = RedbStore::open(&db_path).unwrap();
    assert_eq!(seed_rooms(&store, &seeds).await.unwrap(), 0);

    let r1 = store.get_room(&RoomId::from("r1")).await.unwrap().unwrap();
    assert!(r1.participants.contains(&UserId::from("bob")));
}

#[tokio::test]
async fn request_made_before_restart_is_answered_after() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("vestibule.redb");

    {
        let store = RedbStore::open(&db_path).unwrap();
        store.create_room(&Room::new("r1", "alice")).await.unwrap();

        let mut relay = Relay::new(store, DriverConfig::default());
        relay.connect(2, "bob").await;
        relay.request_join(2, "r1", "bob").await;
    }

    let mut relay = Relay::new(RedbStore::open(&db_path).unwrap(), DriverConfig::default());
    relay.connect(11, "alice").await;
    relay.connect(12, "bob").await;

    let actions = relay.respond(11, "r1", "bob", true).await;
    assert_eq!(deliveries(&actions), vec![(
        12,
        Payload::RequestResponse(RequestResponse {
            chat_id: RoomId::from("r1"),
            status: RequestStatus::Accepted,
        })
    )]);

    let request = relay
        .store()
        .get_join_request(&RoomId::from("r1"), &UserId::from("bob"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.requested_at, EPOCH_MILLIS);
}

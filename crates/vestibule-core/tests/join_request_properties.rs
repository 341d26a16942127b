//! Property tests for the join request lifecycle.
//!
//! Whatever sequence of decisions arrives, a request leaves `pending` at most
//! once and never changes terminal status afterwards.

use proptest::prelude::*;
use vestibule_core::{JoinRequest, RequestError, Room};
use vestibule_proto::{RequestStatus, RoomId, UserId};

fn decision() -> impl Strategy<Value = RequestStatus> {
    prop_oneof![
        Just(RequestStatus::Pending),
        Just(RequestStatus::Accepted),
        Just(RequestStatus::Rejected),
    ]
}

#[test]
fn prop_first_terminal_decision_wins() {
    proptest!(|(decisions in prop::collection::vec(decision(), 1..20))| {
        let mut request = JoinRequest::pending(RoomId::from("r1"), UserId::from("bob"), 0);
        let first_terminal = decisions.iter().copied().find(|s| s.is_terminal());

        for status in &decisions {
            let before = request.status;
            let result = request.resolve(*status);

            match result {
                Ok(()) => prop_assert!(before == RequestStatus::Pending || before == *status),
                Err(RequestError::NotTerminal(_)) => prop_assert_eq!(request.status, before),
                Err(RequestError::AlreadyResolved { current, attempted }) => {
                    prop_assert_eq!(current, before);
                    prop_assert_eq!(attempted, *status);
                    prop_assert_ne!(current, attempted);
                },
            }
        }

        match first_terminal {
            Some(status) => prop_assert_eq!(request.status, status),
            None => prop_assert!(request.is_pending()),
        }
    });
}

#[test]
fn prop_participants_only_grow() {
    proptest!(|(users in prop::collection::vec("[a-e]", 0..30))| {
        let mut room = Room::new("r1", "alice");
        let mut previous = 0;

        for user in users {
            let user = UserId::from(user);
            room.add_participant(user.clone());
            prop_assert!(room.is_member(&user));
            prop_assert!(room.participants.len() >= previous);
            previous = room.participants.len();
        }

        prop_assert!(room.participants.len() <= 5);
    });
}

#[test]
fn records_use_storage_field_names() {
    let request = JoinRequest::pending(RoomId::from("r1"), UserId::from("bob"), 42);
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&request, &mut buf).unwrap();

    let value: ciborium::Value = ciborium::de::from_reader(buf.as_slice()).unwrap();
    let keys: Vec<String> = value
        .as_map()
        .unwrap()
        .iter()
        .filter_map(|(k, _)| k.as_text().map(str::to_string))
        .collect();
    assert_eq!(keys, vec!["roomId", "requesterId", "status", "requestedAt"]);

    let decoded: JoinRequest = ciborium::de::from_reader(buf.as_slice()).unwrap();
    assert_eq!(decoded, request);
}

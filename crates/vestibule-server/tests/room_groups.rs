//! Room group membership and chat relay through the driver.

mod common;

use ciborium::Value;
use common::{Relay, TestEnv, deliveries, logs};
use vestibule_core::{Environment, Room};
use vestibule_proto::{
    ErrorPayload, Frame, FrameHeader, Opcode, Payload, RoomId, payloads::chat::ChatMessage,
};
use vestibule_server::{
    DriverConfig, LogLevel, MembershipPolicy, MemoryStore, RoomStore, ServerEvent,
};

async fn open_relay() -> Relay<MemoryStore> {
    let relay = Relay::new(MemoryStore::new(), DriverConfig::default());
    relay.store().create_room(&Room::new("r1", "alice")).await.unwrap();
    relay
}

async fn strict_relay() -> Relay<MemoryStore> {
    let config =
        DriverConfig { membership: MembershipPolicy::ParticipantsOnly, ..Default::default() };
    let relay = Relay::new(MemoryStore::new(), config);
    relay.store().create_room(&Room::new("r1", "alice")).await.unwrap();
    relay
}

#[tokio::test]
async fn message_reaches_group_but_not_sender() {
    let mut relay = open_relay().await;
    for (session, user) in [(1, "alice"), (2, "bob"), (3, "carol"), (4, "dave")] {
        relay.connect(session, user).await;
    }
    for session in [1, 2, 3] {
        relay.join_group(session, "r1").await;
    }

    let actions = relay.say(2, "r1", "hello").await;

    let expected = Payload::MessageReceived(ChatMessage::new("r1").with_text("text", "hello"));
    assert_eq!(deliveries(&actions), vec![(1, expected.clone()), (3, expected)]);
}

#[tokio::test]
async fn message_fields_are_relayed_verbatim() {
    let mut relay = open_relay().await;
    relay.connect(1, "alice").await;
    relay.connect(2, "bob").await;
    relay.join_group(1, "r1").await;
    relay.join_group(2, "r1").await;

    let mut message = ChatMessage::new("r1").with_text("text", "hi").with_text("sender", "bob");
    message.content.insert("seq".to_string(), Value::Integer(7.into()));
    let actions = relay.send(2, Payload::MessageSend(message.clone())).await;

    assert_eq!(deliveries(&actions), vec![(1, Payload::MessageReceived(message))]);
}

#[tokio::test]
async fn tagged_fields_are_relayed_verbatim() {
    let mut relay = open_relay().await;
    relay.connect(1, "alice").await;
    relay.connect(2, "bob").await;
    relay.join_group(1, "r1").await;
    relay.join_group(2, "r1").await;

    let mut message = ChatMessage::new("r1").with_text("text", "hi");
    let sent_at = Value::Tag(1, Box::new(Value::Integer(1_700_000_000.into())));
    message.content.insert("sentAt".to_string(), sent_at);
    let actions = relay.send(2, Payload::MessageSend(message.clone())).await;

    assert_eq!(deliveries(&actions), vec![(1, Payload::MessageReceived(message))]);
    assert!(logs(&actions, LogLevel::Warn).is_empty());
}

#[tokio::test]
async fn bare_chat_id_joins_group() {
    let mut relay = open_relay().await;
    relay.connect(1, "alice").await;

    let mut body = Vec::new();
    ciborium::ser::into_writer(&Value::Text("r1".into()), &mut body).unwrap();
    let frame = Frame::new(FrameHeader::new(Opcode::ChatJoin), body);
    let actions = relay
        .driver
        .process_event(ServerEvent::FrameReceived { session_id: 1, frame })
        .await
        .unwrap();

    assert!(deliveries(&actions).is_empty());
    assert!(relay.driver.registry().in_group(1, &RoomId::from("r1")));
}

#[tokio::test]
async fn other_devices_of_sender_receive_message() {
    let mut relay = open_relay().await;
    relay.connect(1, "alice").await;
    relay.connect(2, "alice").await;
    relay.join_group(1, "r1").await;
    relay.join_group(2, "r1").await;

    let actions = relay.say(1, "r1", "from laptop").await;
    let recipients: Vec<u64> = deliveries(&actions).into_iter().map(|(s, _)| s).collect();
    assert_eq!(recipients, vec![2]);
}

#[tokio::test]
async fn leaving_stops_delivery() {
    let mut relay = open_relay().await;
    relay.connect(1, "alice").await;
    relay.connect(2, "bob").await;
    relay.join_group(1, "r1").await;
    relay.join_group(2, "r1").await;

    relay.send(2, Payload::ChatLeave(vestibule_proto::payloads::chat::RoomRef {
        chat_id: RoomId::from("r1"),
    }))
    .await;

    let actions = relay.say(1, "r1", "anyone?").await;
    assert!(deliveries(&actions).is_empty());
}

#[tokio::test]
async fn disconnect_releases_group_membership() {
    let mut relay = open_relay().await;
    relay.connect(1, "alice").await;
    relay.connect(2, "bob").await;
    relay.join_group(1, "r1").await;
    relay.join_group(2, "r1").await;

    relay.disconnect(2).await;

    assert_eq!(relay.driver.registry().group_size(&RoomId::from("r1")), 1);
    let actions = relay.say(1, "r1", "bye").await;
    assert!(deliveries(&actions).is_empty());
}

#[tokio::test]
async fn open_policy_lets_strangers_listen() {
    let mut relay = open_relay().await;
    relay.connect(1, "alice").await;
    relay.connect(9, "eve").await;
    relay.join_group(1, "r1").await;

    let actions = relay.join_group(9, "r1").await;
    assert!(deliveries(&actions).is_empty());

    let actions = relay.say(1, "r1", "secret").await;
    assert_eq!(deliveries(&actions).len(), 1);
}

#[tokio::test]
async fn strict_policy_admits_after_acceptance() {
    let mut relay = strict_relay().await;
    relay.connect(1, "alice").await;
    relay.connect(2, "bob").await;

    let actions = relay.join_group(2, "r1").await;
    let replies = deliveries(&actions);
    let [(2, Payload::Error(err))] = replies.as_slice() else {
        panic!("expected one access error, got {replies:?}");
    };
    assert_eq!(err.code, ErrorPayload::ROOM_ACCESS_DENIED);
    assert!(!logs(&actions, LogLevel::Warn).is_empty());

    relay.request_join(2, "r1", "bob").await;
    relay.respond(1, "r1", "bob", true).await;

    let actions = relay.join_group(2, "r1").await;
    assert!(deliveries(&actions).is_empty());
    assert!(relay.driver.registry().in_group(2, &RoomId::from("r1")));
}

#[tokio::test]
async fn strict_policy_refuses_unbound_session() {
    let mut relay = strict_relay().await;
    relay
        .driver
        .process_event(ServerEvent::ConnectionAccepted { session_id: 5 })
        .await
        .unwrap();

    let actions = relay.join_group(5, "r1").await;
    assert!(matches!(deliveries(&actions).as_slice(), [(5, Payload::Error(_))]));
    assert_eq!(relay.driver.registry().group_count(), 0);
}

#[tokio::test]
async fn strict_policy_refuses_missing_room() {
    let mut relay = strict_relay().await;
    relay.connect(1, "alice").await;

    let actions = relay.join_group(1, "r9").await;
    assert!(matches!(deliveries(&actions).as_slice(), [(1, Payload::Error(_))]));
}

#[tokio::test]
async fn allocated_session_id_skips_live_sessions() {
    let mut relay = open_relay().await;
    // Same seed as the relay's environment, so this is the id it draws first.
    let first_draw = TestEnv::default().random_u64();
    relay.connect(first_draw, "alice").await;

    let session_id = relay.driver.allocate_session_id();

    assert_ne!(session_id, first_draw);
    assert!(!relay.driver.registry().has_session(session_id));
    relay.connect(session_id, "bob").await;
    assert_eq!(relay.driver.connection_count(), 2);
}

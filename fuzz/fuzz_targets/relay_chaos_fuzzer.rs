//! Fuzz target for the relay driver over a failing room store
//!
//! Drives `ServerDriver` with arbitrary connection, chat and join request
//! events while `ChaoticStore` fails a fuzzed fraction of store calls.
//!
//! # Invariants
//!
//! - The driver NEVER panics, whatever the store does
//! - Only frames from unknown sessions surface as `Err`
//! - Frames are only ever sent to live sessions
//! - No user becomes a participant without having requested to join

#![no_main]

use std::collections::BTreeSet;

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use vestibule_core::Room;
use vestibule_proto::{
    Frame, FrameHeader, Opcode, Payload, RoomId, UserId,
    payloads::{
        chat::{ChatMessage, RoomRef},
        request::{RequestJoin, RequestRespond},
        session::UserConnect,
    },
};
use vestibule_server::{
    ChaoticStore, DriverConfig, MembershipPolicy, MemoryStore, ReRequestPolicy, RoomStore,
    ServerAction, ServerDriver, ServerEvent, SystemEnv,
};

#[derive(Debug, Arbitrary)]
struct Scenario {
    chaos_seed: u64,
    /// 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    reject_while_pending: bool,
    participants_only: bool,
    events: Vec<Event>,
}

#[derive(Debug, Arbitrary)]
enum Event {
    Accept { session: u8 },
    Close { session: u8 },
    Bind { session: u8, user: u8 },
    Join { session: u8, room: u8 },
    Leave { session: u8, room: u8 },
    Say { session: u8, room: u8 },
    RequestJoin { session: u8, room: u8, user: u8 },
    Respond { session: u8, room: u8, user: u8, accept: bool },
    Ping { session: u8 },
    Garbage { session: u8, opcode_index: u8, bytes: Vec<u8> },
}

fn user(index: u8) -> UserId {
    UserId::from(format!("u{}", index % 4))
}

fn room(index: u8) -> RoomId {
    RoomId::from(format!("r{}", index % 3))
}

fn session(index: u8) -> u64 {
    u64::from(index % 6)
}

fn frame(payload: Payload) -> Frame {
    payload.into_frame(FrameHeader::new(Opcode::Ping)).expect("fuzz payloads encode")
}

fuzz_target!(|scenario: Scenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime builds");

    runtime.block_on(async move {
        let inner = MemoryStore::new();
        // r2 is never created so requests for it always miss.
        inner.create_room(&Room::new("r0", "u0")).await.expect("memory store");
        inner.create_room(&Room::new("r1", "u1")).await.expect("memory store");

        let store = ChaoticStore::with_seed(inner, failure_rate, scenario.chaos_seed);
        let config = DriverConfig {
            re_request: if scenario.reject_while_pending {
                ReRequestPolicy::RejectWhilePending
            } else {
                ReRequestPolicy::Overwrite
            },
            membership: if scenario.participants_only {
                MembershipPolicy::ParticipantsOnly
            } else {
                MembershipPolicy::Open
            },
            ..Default::default()
        };
        let mut driver = ServerDriver::new(SystemEnv::new(), store, config);
        let mut live = BTreeSet::new();

        for event in scenario.events {
            let (target, server_event) = match event {
                Event::Accept { session: s } => {
                    (session(s), ServerEvent::ConnectionAccepted { session_id: session(s) })
                },
                Event::Close { session: s } => {
                    live.remove(&session(s));
                    let reason = "peer closed".to_string();
                    (session(s), ServerEvent::ConnectionClosed { session_id: session(s), reason })
                },
                Event::Bind { session: s, user: u } => {
                    let payload = Payload::UserConnect(UserConnect { user_id: user(u) });
                    (session(s), ServerEvent::FrameReceived { session_id: session(s), frame: frame(payload) })
                },
                Event::Join { session: s, room: r } => {
                    let payload = Payload::ChatJoin(RoomRef { chat_id: room(r) });
                    (session(s), ServerEvent::FrameReceived { session_id: session(s), frame: frame(payload) })
                },
                Event::Leave { session: s, room: r } => {
                    let payload = Payload::ChatLeave(RoomRef { chat_id: room(r) });
                    (session(s), ServerEvent::FrameReceived { session_id: session(s), frame: frame(payload) })
                },
                Event::Say { session: s, room: r } => {
                    let message = ChatMessage::new(room(r)).with_text("text", "fuzz");
                    let payload = Payload::MessageSend(message);
                    (session(s), ServerEvent::FrameReceived { session_id: session(s), frame: frame(payload) })
                },
                Event::RequestJoin { session: s, room: r, user: u } => {
                    let payload =
                        Payload::RequestJoin(RequestJoin { chat_id: room(r), user_id: user(u) });
                    (session(s), ServerEvent::FrameReceived { session_id: session(s), frame: frame(payload) })
                },
                Event::Respond { session: s, room: r, user: u, accept } => {
                    let payload = Payload::RequestRespond(RequestRespond {
                        chat_id: room(r),
                        requester_id: user(u),
                        accept,
                    });
                    (session(s), ServerEvent::FrameReceived { session_id: session(s), frame: frame(payload) })
                },
                Event::Ping { session: s } => {
                    (session(s), ServerEvent::FrameReceived { session_id: session(s), frame: frame(Payload::Ping) })
                },
                Event::Garbage { session: s, opcode_index, bytes } => {
                    let opcodes = [Opcode::UserConnect, Opcode::RequestJoin, Opcode::RequestRespond, Opcode::Pong];
                    let opcode = opcodes[usize::from(opcode_index) % opcodes.len()];
                    let frame = Frame::new(FrameHeader::new(opcode), Bytes::from(bytes));
                    (session(s), ServerEvent::FrameReceived { session_id: session(s), frame })
                },
            };

            let is_frame = matches!(server_event, ServerEvent::FrameReceived { .. });
            let is_accept = matches!(server_event, ServerEvent::ConnectionAccepted { .. });

            match driver.process_event(server_event).await {
                Ok(actions) => {
                    assert!(!is_frame || live.contains(&target), "frame from dead session accepted");
                    let refused = actions.iter().any(|a| {
                        matches!(a, ServerAction::CloseConnection { session_id, .. } if *session_id == target)
                    });
                    if is_accept && !refused {
                        live.insert(target);
                    }
                    for action in &actions {
                        if let ServerAction::SendToSession { session_id, .. } = action {
                            assert!(live.contains(session_id), "send to dead session {session_id}");
                        }
                    }
                },
                Err(_) => assert!(is_frame && !live.contains(&target), "unexpected driver error"),
            }
        }

        let inner = driver.store().inner();
        for room_id in [RoomId::from("r0"), RoomId::from("r1")] {
            let stored = inner.get_room(&room_id).await.expect("memory store").expect("seeded");
            let requested: BTreeSet<UserId> = inner
                .list_join_requests(&room_id)
                .await
                .expect("memory store")
                .into_iter()
                .map(|r| r.requester_id)
                .collect();
            assert!(stored.participants.is_subset(&requested));
        }
    });
});

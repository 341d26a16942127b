//! Property-based tests for frame and payload decoding.
//!
//! The relay reads frames from untrusted clients, so decoding must never
//! panic and must reject anything it cannot account for.

use bytes::Bytes;
use proptest::prelude::*;
use vestibule_proto::{
    Frame, FrameHeader, Opcode, Payload, ProtocolError, RoomId, UserId,
    payloads::{chat::ChatMessage, request::RequestJoin},
};

fn arbitrary_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::UserConnect),
        Just(Opcode::ChatJoin),
        Just(Opcode::ChatLeave),
        Just(Opcode::MessageSend),
        Just(Opcode::MessageReceived),
        Just(Opcode::RequestJoin),
        Just(Opcode::RequestRespond),
        Just(Opcode::RequestReceived),
        Just(Opcode::RequestResponse),
        Just(Opcode::Ping),
        Just(Opcode::Pong),
        Just(Opcode::Error),
    ]
}

fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (arbitrary_opcode(), any::<u32>(), prop::collection::vec(any::<u8>(), 0..1024)).prop_map(
        |(opcode, request_id, payload)| {
            let mut header = FrameHeader::new(opcode);
            header.set_request_id(request_id);
            Frame::new(header, Bytes::from(payload))
        },
    )
}

#[test]
fn prop_frame_encode_decode_roundtrip() {
    proptest!(|(frame in arbitrary_frame())| {
        let wire = frame.to_vec().expect("encode should succeed");
        prop_assert_eq!(wire.len(), frame.encoded_len());

        let decoded = Frame::decode(&wire).expect("decode should succeed");
        prop_assert_eq!(decoded, frame);
    });
}

#[test]
fn prop_decode_never_panics_on_garbage() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..256))| {
        if let Ok(frame) = Frame::decode(&bytes) {
            prop_assert!(frame.payload.len() <= FrameHeader::MAX_PAYLOAD_SIZE as usize);
            let _ = Payload::from_frame(&frame);
        }
    });
}

#[test]
fn prop_truncation_is_detected() {
    proptest!(|(frame in arbitrary_frame(), cut in 1usize..64)| {
        let wire = frame.to_vec().expect("encode should succeed");
        prop_assume!(cut <= wire.len());

        let truncated = &wire[..wire.len() - cut];
        prop_assert!(Frame::decode(truncated).is_err());
    });
}

#[test]
fn prop_chat_message_relayed_verbatim() {
    proptest!(|(room in "[a-z0-9]{1,16}", fields in prop::collection::btree_map("[a-z]{1,8}", "[ -~]{0,32}", 0..6))| {
        let mut message = ChatMessage::new(room.as_str());
        for (key, value) in &fields {
            message = message.with_text(key, value);
        }

        let frame = Payload::MessageSend(message.clone())
            .into_frame(FrameHeader::new(Opcode::MessageSend))
            .expect("encode should succeed");
        let decoded = Payload::from_frame(&frame).expect("decode should succeed");

        prop_assert_eq!(decoded, Payload::MessageSend(message));
    });
}

#[test]
fn request_join_decodes_from_camel_case_map() {
    let mut body = Vec::new();
    let value = ciborium::Value::Map(vec![
        (ciborium::Value::Text("chatId".into()), ciborium::Value::Text("r1".into())),
        (ciborium::Value::Text("userId".into()), ciborium::Value::Text("bob".into())),
    ]);
    ciborium::ser::into_writer(&value, &mut body).expect("cbor");

    let decoded = Payload::decode(Opcode::RequestJoin, &body).expect("decode");
    assert_eq!(
        decoded,
        Payload::RequestJoin(RequestJoin { chat_id: RoomId::from("r1"), user_id: UserId::from("bob") })
    );
}

#[test]
fn empty_body_is_invalid_for_control_events() {
    let result = Payload::decode(Opcode::UserConnect, &[]);
    assert!(matches!(result, Err(ProtocolError::CborDecode(_))));
}

//! Fuzz target for Payload::from_frame
//!
//! Feeds arbitrary CBOR under every opcode to catch type confusion and
//! oversized collections. Decoding must fail cleanly, never panic.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use vestibule_proto::{Frame, FrameHeader, Opcode, Payload};

fuzz_target!(|data: &[u8]| {
    let opcodes = [
        Opcode::UserConnect,
        Opcode::ChatJoin,
        Opcode::ChatLeave,
        Opcode::MessageSend,
        Opcode::MessageReceived,
        Opcode::RequestJoin,
        Opcode::RequestRespond,
        Opcode::RequestReceived,
        Opcode::RequestResponse,
        Opcode::Ping,
        Opcode::Pong,
        Opcode::Error,
    ];

    for opcode in opcodes {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::copy_from_slice(data));
        if let Ok(payload) = Payload::from_frame(&frame) {
            assert_eq!(payload.opcode(), opcode);
        }
    }
});

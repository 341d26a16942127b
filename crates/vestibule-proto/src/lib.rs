//! Vestibule wire protocol.
//!
//! Every message exchanged between a client session and the relay is a
//! [`Frame`]: a fixed 16-byte binary header followed by a CBOR payload. The
//! header carries the [`Opcode`], which names the transport event
//! (`user:connect`, `request:join`, ...) and determines how the payload bytes
//! decode into a [`Payload`].
//!
//! The relay routes chat traffic without looking past the header and the
//! room identifier; only the control events (identity binding, join requests)
//! are decoded server-side.

#![forbid(unsafe_code)]

pub mod errors;
mod frame;
mod header;
mod ids;
mod opcodes;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use ids::{RequestStatus, RoomId, UserId};
pub use opcodes::Opcode;
pub use payloads::{ErrorPayload, Payload};

/// ALPN protocol identifier negotiated during the QUIC handshake.
pub const ALPN_PROTOCOL: &[u8] = b"vestibule/1";

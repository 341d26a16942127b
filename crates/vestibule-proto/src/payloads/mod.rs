//! CBOR-encoded event payloads.
//!
//! Frame headers are raw binary, payload bodies are CBOR with camelCase field
//! names so they line up with the event payloads clients already speak
//! (`chatId`, `requesterId`, ...).
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). No variant tag is serialized; the header opcode selects
//! the body type on decode.

pub mod chat;
pub mod request;
pub mod session;

use bytes::BufMut;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All frame payloads, one per [`Opcode`].
///
/// Derives only `PartialEq`: chat messages carry arbitrary CBOR values, and
/// CBOR floats have no total equality.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `user:connect`
    UserConnect(session::UserConnect),
    /// `chat:join`
    ChatJoin(chat::RoomRef),
    /// `chat:leave`
    ChatLeave(chat::RoomRef),

    /// `message:send`
    MessageSend(chat::ChatMessage),
    /// `message:received`
    MessageReceived(chat::ChatMessage),

    /// `request:join`
    RequestJoin(request::RequestJoin),
    /// `request:respond`
    RequestRespond(request::RequestRespond),
    /// `request:received`
    RequestReceived(request::RequestReceived),
    /// `request:response`
    RequestResponse(request::RequestResponse),

    /// Liveness probe (empty body)
    Ping,
    /// Liveness reply
    Pong(session::Pong),

    /// Error reply
    Error(ErrorPayload),
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Payload body could not be decoded for its opcode.
    pub const INVALID_PAYLOAD: u16 = 0x0001;
    /// Opcode is unknown or reserved for the relay.
    pub const UNEXPECTED_OPCODE: u16 = 0x0002;
    /// Session may not join the requested room group.
    pub const ROOM_ACCESS_DENIED: u16 = 0x0003;

    /// Create an invalid payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into() }
    }

    /// Create an unexpected opcode error.
    pub fn unexpected_opcode(opcode: u16) -> Self {
        Self { code: Self::UNEXPECTED_OPCODE, message: format!("unexpected opcode: {opcode:#06x}") }
    }

    /// Create a room access error.
    pub fn room_access_denied(room_id: &crate::RoomId) -> Self {
        Self {
            code: Self::ROOM_ACCESS_DENIED,
            message: format!("not a participant of room {room_id}"),
        }
    }
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::UserConnect(_) => Opcode::UserConnect,
            Self::ChatJoin(_) => Opcode::ChatJoin,
            Self::ChatLeave(_) => Opcode::ChatLeave,
            Self::MessageSend(_) => Opcode::MessageSend,
            Self::MessageReceived(_) => Opcode::MessageReceived,
            Self::RequestJoin(_) => Opcode::RequestJoin,
            Self::RequestRespond(_) => Opcode::RequestRespond,
            Self::RequestReceived(_) => Opcode::RequestReceived,
            Self::RequestResponse(_) => Opcode::RequestResponse,
            Self::Ping => Opcode::Ping,
            Self::Pong(_) => Opcode::Pong,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode the payload body to `dst`.
    ///
    /// Serializes only the inner struct. Size limits are enforced later by
    /// [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::UserConnect(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::ChatJoin(inner) | Self::ChatLeave(inner) => {
                ciborium::ser::into_writer(inner, &mut writer)
            },
            Self::MessageSend(inner) | Self::MessageReceived(inner) => {
                ciborium::ser::into_writer(inner, &mut writer)
            },
            Self::RequestJoin(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RequestRespond(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RequestReceived(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RequestResponse(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Ping => Ok(()),
            Self::Pong(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode a payload body for `opcode`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed `MAX_PAYLOAD_SIZE`
    /// - `ProtocolError::CborDecode` if the body does not match the opcode
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::UserConnect => Self::UserConnect(decode_cbor(bytes)?),
            Opcode::ChatJoin => Self::ChatJoin(decode_cbor(bytes)?),
            Opcode::ChatLeave => Self::ChatLeave(decode_cbor(bytes)?),
            Opcode::MessageSend => Self::MessageSend(decode_cbor(bytes)?),
            Opcode::MessageReceived => Self::MessageReceived(decode_cbor(bytes)?),
            Opcode::RequestJoin => Self::RequestJoin(decode_cbor(bytes)?),
            Opcode::RequestRespond => Self::RequestRespond(decode_cbor(bytes)?),
            Opcode::RequestReceived => Self::RequestReceived(decode_cbor(bytes)?),
            Opcode::RequestResponse => Self::RequestResponse(decode_cbor(bytes)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong(decode_cbor(bytes)?),
            Opcode::Error => Self::Error(decode_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame.
    ///
    /// Sets the header opcode from the variant and the payload size from the
    /// encoded body. The request id of `header` is preserved.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Parse payload from a raw transport frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the header opcode is unassigned
    /// - Errors from [`Payload::decode`]
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or_else(|| ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

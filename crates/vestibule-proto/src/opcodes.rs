//! Operation codes.
//!
//! One opcode per transport event. Client-originated events live in the low
//! ranges of each group, server-originated ones follow them.

/// Frame operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// `user:connect`: bind an identity to the session
    UserConnect = 0x0001,
    /// `chat:join`: add the session to a room group
    ChatJoin = 0x0002,
    /// `chat:leave`: remove the session from a room group
    ChatLeave = 0x0003,

    /// `message:send`: chat message from a client
    MessageSend = 0x0010,
    /// `message:received`: chat message relayed to the other group members
    MessageReceived = 0x0011,

    /// `request:join`: ask a room's creator for admission
    RequestJoin = 0x0020,
    /// `request:respond`: creator accepts or rejects a request
    RequestRespond = 0x0021,
    /// `request:received`: creator is told about a new request
    RequestReceived = 0x0022,
    /// `request:response`: requester is told about the outcome
    RequestResponse = 0x0023,

    /// Liveness probe
    Ping = 0x0030,
    /// Liveness reply with server status and time
    Pong = 0x0031,

    /// Error reply
    Error = 0x00FF,
}

impl Opcode {
    /// Raw wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value. `None` if unassigned.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::UserConnect),
            0x0002 => Some(Self::ChatJoin),
            0x0003 => Some(Self::ChatLeave),
            0x0010 => Some(Self::MessageSend),
            0x0011 => Some(Self::MessageReceived),
            0x0020 => Some(Self::RequestJoin),
            0x0021 => Some(Self::RequestRespond),
            0x0022 => Some(Self::RequestReceived),
            0x0023 => Some(Self::RequestResponse),
            0x0030 => Some(Self::Ping),
            0x0031 => Some(Self::Pong),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }

    /// Transport event name, as clients spell it.
    #[must_use]
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::UserConnect => "user:connect",
            Self::ChatJoin => "chat:join",
            Self::ChatLeave => "chat:leave",
            Self::MessageSend => "message:send",
            Self::MessageReceived => "message:received",
            Self::RequestJoin => "request:join",
            Self::RequestRespond => "request:respond",
            Self::RequestReceived => "request:received",
            Self::RequestResponse => "request:response",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Error => "error",
        }
    }

    /// Events only the relay may emit. A client sending one is a protocol
    /// violation.
    #[must_use]
    pub const fn is_server_only(self) -> bool {
        matches!(
            self,
            Self::MessageReceived
                | Self::RequestReceived
                | Self::RequestResponse
                | Self::Pong
                | Self::Error
        )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Opcode; 12] = [
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

    #[test]
    fn wire_values_round_trip() {
        for opcode in ALL {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unassigned_values_are_rejected() {
        assert_eq!(Opcode::from_u16(0x0000), None);
        assert_eq!(Opcode::from_u16(0x0024), None);
        assert_eq!(Opcode::from_u16(0xFFFF), None);
    }

    #[test]
    fn event_names_match_transport_events() {
        assert_eq!(Opcode::RequestJoin.event_name(), "request:join");
        assert_eq!(Opcode::RequestResponse.to_string(), "request:response");
        assert_eq!(Opcode::MessageReceived.event_name(), "message:received");
    }

    #[test]
    fn server_only_events() {
        assert!(Opcode::RequestReceived.is_server_only());
        assert!(Opcode::MessageReceived.is_server_only());
        assert!(!Opcode::MessageSend.is_server_only());
        assert!(!Opcode::RequestRespond.is_server_only());
    }
}

//! Message routing over the session registry.
//!
//! Chat messages fan out to a room's group, minus the sending session.
//! Control notifications go to a user address, i.e. every session bound to
//! that user. Delivery is fire-and-forget: no acknowledgment, no queue for
//! offline users.

use vestibule_proto::{
    Frame, FrameHeader, Opcode, Payload, ProtocolError, UserId, payloads::chat::ChatMessage,
};

use crate::{driver::ServerAction, registry::SessionRegistry};

/// Read-only view of the registry that turns deliveries into send actions.
#[derive(Debug, Clone, Copy)]
pub struct MessageRouter<'a> {
    registry: &'a SessionRegistry,
}

impl<'a> MessageRouter<'a> {
    /// Route over `registry` as it is right now.
    pub fn new(registry: &'a SessionRegistry) -> Self {
        Self { registry }
    }

    /// Relay `message` as `message:received` to every session in its room's
    /// group except `sender_session`.
    ///
    /// No participant check: any session in the group receives it. Other
    /// sessions of the sender's own user do receive it.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if the message cannot be encoded
    pub fn route_message(
        &self,
        sender_session: u64,
        message: ChatMessage,
    ) -> Result<Vec<ServerAction>, ProtocolError> {
        let room_id = message.chat_id.clone();
        let recipients: Vec<u64> =
            self.registry.sessions_in_group(&room_id).filter(|s| *s != sender_session).collect();

        if recipients.is_empty() {
            return Ok(Vec::new());
        }

        let frame = Payload::MessageReceived(message)
            .into_frame(FrameHeader::new(Opcode::MessageReceived))?;
        Ok(fan_out(recipients, &frame))
    }

    /// Deliver `payload` to every session bound to `user_id`.
    ///
    /// Returns no actions when the user is offline; the notification is
    /// dropped.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if the payload cannot be encoded
    pub fn notify_user(
        &self,
        user_id: &UserId,
        payload: Payload,
    ) -> Result<Vec<ServerAction>, ProtocolError> {
        let recipients: Vec<u64> = self.registry.resolve_user_address(user_id).collect();

        if recipients.is_empty() {
            return Ok(Vec::new());
        }

        let header = FrameHeader::new(payload.opcode());
        let frame = payload.into_frame(header)?;
        Ok(fan_out(recipients, &frame))
    }
}

fn fan_out(recipients: Vec<u64>, frame: &Frame) -> Vec<ServerAction> {
    recipients
        .into_iter()
        .map(|session_id| ServerAction::SendToSession { session_id, frame: frame.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use vestibule_proto::{RequestStatus, RoomId, payloads::request::RequestResponse};

    use super::*;

    fn recipients(actions: &[ServerAction]) -> Vec<u64> {
        actions
            .iter()
            .filter_map(|a| match a {
                ServerAction::SendToSession { session_id, .. } => Some(*session_id),
                _ => None,
            })
            .collect()
    }

    fn registry_with_group() -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        for session in 1..=3 {
            registry.register_session(session).unwrap();
            registry.join_group(session, &RoomId::from("r1")).unwrap();
        }
        registry.register_session(4).unwrap();
        registry
    }

    #[test]
    fn route_excludes_sender() {
        let registry = registry_with_group();
        let router = MessageRouter::new(&registry);

        let actions = router.route_message(2, ChatMessage::new("r1").with_text("text", "hi")).unwrap();
        assert_eq!(recipients(&actions), vec![1, 3]);

        let ServerAction::SendToSession { frame, .. } = &actions[0] else {
            panic!("expected send action");
        };
        assert_eq!(frame.header.opcode_enum(), Some(Opcode::MessageReceived));
    }

    #[test]
    fn route_to_unknown_room_is_empty() {
        let registry = registry_with_group();
        let actions = MessageRouter::new(&registry).route_message(1, ChatMessage::new("r2")).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn notify_reaches_every_device() {
        let mut registry = registry_with_group();
        registry.bind_identity(1, UserId::from("bob")).unwrap();
        registry.bind_identity(4, UserId::from("bob")).unwrap();

        let payload = Payload::RequestResponse(RequestResponse {
            chat_id: RoomId::from("r1"),
            status: RequestStatus::Accepted,
        });
        let actions = MessageRouter::new(&registry).notify_user(&UserId::from("bob"), payload).unwrap();
        assert_eq!(recipients(&actions), vec![1, 4]);
    }

    #[test]
    fn notify_offline_user_is_dropped() {
        let registry = registry_with_group();
        let actions = MessageRouter::new(&registry).notify_user(&UserId::from("carol"), Payload::Ping).unwrap();
        assert!(actions.is_empty());
    }
}

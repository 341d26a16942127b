//! Connection lifecycle: sessions come and go, join and leave room groups.
//!
//! [`ConnectionManager`] is the single writer of the [`SessionRegistry`]. The
//! router only reads it.

use std::collections::BTreeSet;

use thiserror::Error;
use vestibule_proto::{RoomId, UserId};

use crate::registry::{BindOutcome, RegistryError, SessionRegistry};

/// Reasons a new connection is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Connection limit reached
    #[error("max connections exceeded ({0})")]
    AtCapacity(usize),

    /// Session id collision
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What a disconnect released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedSession {
    /// Identity the session was bound to
    pub user_id: Option<UserId>,
    /// Room groups the session was in
    pub rooms: BTreeSet<RoomId>,
}

/// Owns the session registry and enforces the connection limit.
#[derive(Debug)]
pub struct ConnectionManager {
    registry: SessionRegistry,
    max_connections: usize,
}

impl ConnectionManager {
    /// Create a manager admitting at most `max_connections` sessions.
    pub fn new(max_connections: usize) -> Self {
        Self { registry: SessionRegistry::new(), max_connections }
    }

    /// Register a freshly accepted session with no identity.
    pub fn on_connect(&mut self, session_id: u64) -> Result<(), ConnectError> {
        if self.registry.session_count() >= self.max_connections {
            return Err(ConnectError::AtCapacity(self.max_connections));
        }

        self.registry.register_session(session_id)?;
        Ok(())
    }

    /// Bind an identity to a session (`user:connect`).
    pub fn bind_identity(
        &mut self,
        session_id: u64,
        user_id: UserId,
    ) -> Result<BindOutcome, RegistryError> {
        self.registry.bind_identity(session_id, user_id)
    }

    /// Add the session to a room's group.
    ///
    /// The room is not looked up: joining the group of a room that does not
    /// exist is allowed and simply receives no traffic.
    pub fn join_room_group(&mut self, session_id: u64, room_id: &RoomId) -> Result<bool, RegistryError> {
        self.registry.join_group(session_id, room_id)
    }

    /// Remove the session from a room's group. Leaving a group the session
    /// is not in returns `Ok(false)`.
    pub fn leave_room_group(
        &mut self,
        session_id: u64,
        room_id: &RoomId,
    ) -> Result<bool, RegistryError> {
        self.registry.leave_group(session_id, room_id)
    }

    /// Release a session and all its memberships.
    ///
    /// `None` if the session was already released, so duplicate close
    /// signals from the transport are harmless.
    pub fn on_disconnect(&mut self, session_id: u64) -> Option<ReleasedSession> {
        self.registry
            .unregister_session(session_id)
            .map(|(info, rooms)| ReleasedSession { user_id: info.user_id, rooms })
    }

    /// Read access for routing.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Number of live sessions.
    pub fn connection_count(&self) -> usize {
        self.registry.session_count()
    }
}

//! Session registry: identities, user addresses and room groups.
//!
//! The registry keeps three indexes consistent with each other:
//!
//! - session → bound user (`None` until `user:connect`)
//! - user → sessions, the concrete form of the `user:{id}` address
//! - room ↔ sessions, the transport-level room groups, in both directions
//!
//! A user may be bound on many sessions at once (one per device). Group
//! membership is transport state only; it says nothing about whether the user
//! was admitted to the room.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;
use vestibule_proto::{RoomId, UserId};

/// Registry lookup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Session was never registered or has been released
    #[error("session not found: {0}")]
    SessionNotFound(u64),

    /// Session id is already in use
    #[error("session already exists: {0}")]
    SessionAlreadyExists(u64),
}

/// State kept for one live session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Identity bound by `user:connect`
    pub user_id: Option<UserId>,
}

/// Outcome of binding an identity to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// Session had no identity and is now bound
    Bound,
    /// Session was already bound to this user
    Unchanged,
    /// Session moved from `previous` to the new user
    Rebound {
        /// Identity the session was bound to before
        previous: UserId,
    },
}

/// Session, identity and room group tables.
///
/// Session sets are ordered so that fan-out order is stable.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Session ID → session info
    sessions: HashMap<u64, SessionInfo>,
    /// User → bound sessions (user address)
    user_sessions: HashMap<UserId, BTreeSet<u64>>,
    /// Room → sessions in its group
    room_groups: HashMap<RoomId, BTreeSet<u64>>,
    /// Session → rooms whose group it is in
    session_rooms: HashMap<u64, BTreeSet<RoomId>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session with no bound identity.
    pub fn register_session(&mut self, session_id: u64) -> Result<(), RegistryError> {
        if self.sessions.contains_key(&session_id) {
            return Err(RegistryError::SessionAlreadyExists(session_id));
        }

        self.sessions.insert(session_id, SessionInfo::default());
        self.session_rooms.insert(session_id, BTreeSet::new());
        Ok(())
    }

    /// Remove a session from every index.
    ///
    /// Returns the session's info and the rooms it was in, or `None` if the
    /// session was already released.
    pub fn unregister_session(&mut self, session_id: u64) -> Option<(SessionInfo, BTreeSet<RoomId>)> {
        let info = self.sessions.remove(&session_id)?;
        let rooms = self.session_rooms.remove(&session_id).unwrap_or_default();

        if let Some(user_id) = &info.user_id {
            self.detach_user(user_id, session_id);
        }

        for room_id in &rooms {
            if let Some(members) = self.room_groups.get_mut(room_id) {
                members.remove(&session_id);
                if members.is_empty() {
                    self.room_groups.remove(room_id);
                }
            }
        }

        Some((info, rooms))
    }

    /// Bind `user_id` to a session, making it reachable at the user's
    /// address.
    ///
    /// Binding the same user again is a no-op. Binding a different user moves
    /// the session from the old address to the new one.
    pub fn bind_identity(
        &mut self,
        session_id: u64,
        user_id: UserId,
    ) -> Result<BindOutcome, RegistryError> {
        let info =
            self.sessions.get_mut(&session_id).ok_or(RegistryError::SessionNotFound(session_id))?;

        let previous = match info.user_id.replace(user_id.clone()) {
            Some(previous) if previous == user_id => return Ok(BindOutcome::Unchanged),
            other => other,
        };

        self.user_sessions.entry(user_id).or_default().insert(session_id);

        match previous {
            Some(previous) => {
                self.detach_user(&previous, session_id);
                Ok(BindOutcome::Rebound { previous })
            },
            None => Ok(BindOutcome::Bound),
        }
    }

    /// Sessions currently bound to `user_id`. Empty when the user is offline.
    pub fn resolve_user_address(&self, user_id: &UserId) -> impl Iterator<Item = u64> + '_ {
        self.user_sessions.get(user_id).into_iter().flat_map(|s| s.iter().copied())
    }

    /// Identity bound to a session, if any.
    pub fn user_for_session(&self, session_id: u64) -> Option<&UserId> {
        self.sessions.get(&session_id).and_then(|info| info.user_id.as_ref())
    }

    /// Check if a session is registered.
    pub fn has_session(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Add a session to a room's group.
    ///
    /// Returns `Ok(false)` if the session was already in the group.
    pub fn join_group(&mut self, session_id: u64, room_id: &RoomId) -> Result<bool, RegistryError> {
        let rooms = self
            .session_rooms
            .get_mut(&session_id)
            .ok_or(RegistryError::SessionNotFound(session_id))?;

        if !rooms.insert(room_id.clone()) {
            return Ok(false);
        }

        self.room_groups.entry(room_id.clone()).or_default().insert(session_id);
        Ok(true)
    }

    /// Remove a session from a room's group.
    ///
    /// Returns `Ok(false)` if the session was not in the group.
    pub fn leave_group(&mut self, session_id: u64, room_id: &RoomId) -> Result<bool, RegistryError> {
        let rooms = self
            .session_rooms
            .get_mut(&session_id)
            .ok_or(RegistryError::SessionNotFound(session_id))?;

        if !rooms.remove(room_id) {
            return Ok(false);
        }

        if let Some(members) = self.room_groups.get_mut(room_id) {
            members.remove(&session_id);
            if members.is_empty() {
                self.room_groups.remove(room_id);
            }
        }
        Ok(true)
    }

    /// Check if a session is in a room's group.
    pub fn in_group(&self, session_id: u64, room_id: &RoomId) -> bool {
        self.room_groups.get(room_id).is_some_and(|s| s.contains(&session_id))
    }

    /// All sessions in a room's group.
    pub fn sessions_in_group<'a>(&'a self, room_id: &RoomId) -> impl Iterator<Item = u64> + 'a {
        self.room_groups.get(room_id).into_iter().flat_map(|s| s.iter().copied())
    }

    /// All rooms whose group a session is in.
    pub fn rooms_for_session(&self, session_id: u64) -> impl Iterator<Item = &RoomId> + '_ {
        self.session_rooms.get(&session_id).into_iter().flatten()
    }

    /// Total number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of sessions in a room's group.
    pub fn group_size(&self, room_id: &RoomId) -> usize {
        self.room_groups.get(room_id).map_or(0, BTreeSet::len)
    }

    /// Number of non-empty room groups.
    pub fn group_count(&self) -> usize {
        self.room_groups.len()
    }

    fn detach_user(&mut self, user_id: &UserId, session_id: u64) {
        if let Some(sessions) = self.user_sessions.get_mut(user_id) {
            sessions.remove(&session_id);
            if sessions.is_empty() {
                self.user_sessions.remove(user_id);
            }
        }
    }
}

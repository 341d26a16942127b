//! Server driver.
//!
//! Ties together the connection lifecycle (session registry owner), the join
//! request coordinator (room store), and the message router. The driver is
//! Sans-IO: it consumes [`ServerEvent`]s and returns [`ServerAction`]s for a
//! runtime to execute. Store calls are the only suspension points.

use vestibule_core::Environment;
use vestibule_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::{
        ErrorPayload,
        chat::{ChatMessage, RoomRef},
        request::{RequestJoin, RequestRespond},
        session::{Pong, UserConnect},
    },
};

use crate::{
    coordinator::{CoordinatorError, Notification, ReRequestPolicy, RequestCoordinator},
    lifecycle::{ConnectError, ConnectionManager},
    registry::{BindOutcome, SessionRegistry},
    router::MessageRouter,
    server_error::ServerError,
    storage::{RoomStore, StoreError},
};

/// Who may join a room's group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MembershipPolicy {
    /// Any session may join any room group
    #[default]
    Open,
    /// Only sessions bound to the room's creator or an accepted participant
    ParticipantsOnly,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Handling of a join request while one is already pending
    pub re_request: ReRequestPolicy,
    /// Room group admission
    pub membership: MembershipPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            re_request: ReRequestPolicy::default(),
            membership: MembershipPolicy::default(),
        }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (QUIC server or tests).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique session ID assigned by the runtime
        session_id: u64,
    },

    /// A frame was received from a connection
    FrameReceived {
        /// Session that sent the frame
        session_id: u64,
        /// The received frame
        frame: Frame,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Session that was closed
        session_id: u64,
        /// Reason for closure
        reason: String,
    },
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a frame to a specific session
    SendToSession {
        /// Target session ID
        session_id: u64,
        /// Frame to send
        frame: Frame,
    },

    /// Close a connection
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
        /// Wall-clock time of the event (Unix millis)
        timestamp: u64,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based server driver.
///
/// Orchestrates connection management, join request coordination and frame
/// routing.
pub struct ServerDriver<E, S>
where
    E: Environment,
    S: RoomStore,
{
    /// Session registry owner
    connections: ConnectionManager,
    /// Join request state machine
    coordinator: RequestCoordinator<S, E>,
    /// Environment (time, RNG)
    env: E,
    /// Server configuration
    config: ServerConfig,
}

impl<E, S> ServerDriver<E, S>
where
    E: Environment,
    S: RoomStore,
{
    /// Create a new server driver.
    pub fn new(env: E, store: S, config: ServerConfig) -> Self {
        Self {
            connections: ConnectionManager::new(config.max_connections),
            coordinator: RequestCoordinator::new(store, env.clone(), config.re_request),
            env,
            config,
        }
    }

    /// Process a server event and return actions to execute.
    ///
    /// Coordinator and store failures never surface here; they come back as
    /// `Log` actions.
    ///
    /// # Errors
    ///
    /// - `ServerError::SessionNotFound` if a frame arrives for a session that
    ///   was never accepted or is already closed
    pub async fn process_event(
        &mut self,
        event: ServerEvent,
    ) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                Ok(self.handle_connection_accepted(session_id))
            },
            ServerEvent::FrameReceived { session_id, frame } => {
                self.handle_frame_received(session_id, frame).await
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_connection_closed(session_id, &reason))
            },
        }
    }

    /// Number of live sessions.
    pub fn connection_count(&self) -> usize {
        self.connections.connection_count()
    }

    /// Read access to the session registry.
    pub fn registry(&self) -> &SessionRegistry {
        self.connections.registry()
    }

    /// Backing room store.
    pub fn store(&self) -> &S {
        self.coordinator.store()
    }

    /// Active configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Random session id not held by any live session.
    pub fn allocate_session_id(&self) -> u64 {
        loop {
            let session_id = self.env.random_u64();
            if !self.connections.registry().has_session(session_id) {
                return session_id;
            }
        }
    }

    fn handle_connection_accepted(&mut self, session_id: u64) -> Vec<ServerAction> {
        match self.connections.on_connect(session_id) {
            Ok(()) => vec![self.log(LogLevel::Debug, format!("session {session_id} accepted"))],
            Err(err) => {
                let reason = err.to_string();
                let level = match err {
                    ConnectError::AtCapacity(_) => LogLevel::Warn,
                    ConnectError::Registry(_) => LogLevel::Error,
                };
                vec![
                    ServerAction::CloseConnection { session_id, reason: reason.clone() },
                    self.log(level, format!("refused session {session_id}: {reason}")),
                ]
            },
        }
    }

    fn handle_connection_closed(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        let message = match self.connections.on_disconnect(session_id) {
            Some(released) => {
                let user = released.user_id.as_ref().map_or("<unbound>", |u| u.as_str());
                format!(
                    "session {session_id} ({user}) closed: {reason}, left {} room groups",
                    released.rooms.len()
                )
            },
            None => format!("session {session_id} already released: {reason}"),
        };
        vec![self.log(LogLevel::Debug, message)]
    }

    async fn handle_frame_received(
        &mut self,
        session_id: u64,
        frame: Frame,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if !self.connections.registry().has_session(session_id) {
            return Err(ServerError::SessionNotFound(session_id));
        }

        let request_id = frame.header.request_id();
        let Some(opcode) = frame.header.opcode_enum() else {
            let raw = frame.header.opcode();
            return Ok(self.error_reply(
                session_id,
                request_id,
                ErrorPayload::unexpected_opcode(raw),
            ));
        };

        if opcode.is_server_only() {
            return Ok(self.error_reply(
                session_id,
                request_id,
                ErrorPayload::unexpected_opcode(opcode.to_u16()),
            ));
        }

        let payload = match Payload::from_frame(&frame) {
            Ok(payload) => payload,
            Err(err) => {
                return Ok(self.error_reply(
                    session_id,
                    request_id,
                    ErrorPayload::invalid_payload(format!("{opcode}: {err}")),
                ));
            },
        };

        let actions = match payload {
            Payload::UserConnect(connect) => self.handle_user_connect(session_id, connect)?,
            Payload::ChatJoin(room) => self.handle_chat_join(session_id, request_id, room).await?,
            Payload::ChatLeave(room) => self.handle_chat_leave(session_id, &room)?,
            Payload::MessageSend(message) => self.handle_message_send(session_id, message),
            Payload::RequestJoin(request) => self.handle_request_join(request).await,
            Payload::RequestRespond(response) => self.handle_request_respond(response).await,
            Payload::Ping => self.handle_ping(session_id, request_id),
            Payload::MessageReceived(_)
            | Payload::RequestReceived(_)
            | Payload::RequestResponse(_)
            | Payload::Pong(_)
            | Payload::Error(_) => self.error_reply(
                session_id,
                request_id,
                ErrorPayload::unexpected_opcode(opcode.to_u16()),
            ),
        };

        Ok(actions)
    }

    fn handle_user_connect(
        &mut self,
        session_id: u64,
        connect: UserConnect,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let user_id = connect.user_id;
        let outcome = self.connections.bind_identity(session_id, user_id.clone())?;

        let action = match outcome {
            BindOutcome::Bound => {
                self.log(LogLevel::Debug, format!("session {session_id} bound to {user_id}"))
            },
            BindOutcome::Unchanged => self.log(
                LogLevel::Debug,
                format!("session {session_id} already bound to {user_id}"),
            ),
            BindOutcome::Rebound { previous } => self.log(
                LogLevel::Info,
                format!("session {session_id} rebound from {previous} to {user_id}"),
            ),
        };
        Ok(vec![action])
    }

    async fn handle_chat_join(
        &mut self,
        session_id: u64,
        request_id: u32,
        room: RoomRef,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let room_id = room.chat_id;

        if self.config.membership == MembershipPolicy::ParticipantsOnly {
            let user = self.connections.registry().user_for_session(session_id).cloned();
            let admitted = match &user {
                Some(user) => self.coordinator.is_member(&room_id, user).await,
                None => Ok(false),
            };

            match admitted {
                Ok(true) => {},
                Ok(false) => {
                    let user = user.as_ref().map_or("<unbound>", |u| u.as_str());
                    let mut actions = self.error_reply(
                        session_id,
                        request_id,
                        ErrorPayload::room_access_denied(&room_id),
                    );
                    actions.push(self.log(
                        LogLevel::Warn,
                        format!("session {session_id} ({user}) denied chat:join for room {room_id}"),
                    ));
                    return Ok(actions);
                },
                Err(err) => {
                    let mut actions = self.error_reply(
                        session_id,
                        request_id,
                        ErrorPayload::room_access_denied(&room_id),
                    );
                    actions.push(self.log(
                        LogLevel::Error,
                        format!("membership check failed for room {room_id}: {err}"),
                    ));
                    return Ok(actions);
                },
            }
        }

        let joined = self.connections.join_room_group(session_id, &room_id)?;
        let message = if joined {
            format!("session {session_id} joined room group {room_id}")
        } else {
            format!("session {session_id} already in room group {room_id}")
        };
        Ok(vec![self.log(LogLevel::Debug, message)])
    }

    fn handle_chat_leave(
        &mut self,
        session_id: u64,
        room: &RoomRef,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let left = self.connections.leave_room_group(session_id, &room.chat_id)?;
        if !left {
            return Ok(Vec::new());
        }
        Ok(vec![self.log(
            LogLevel::Debug,
            format!("session {session_id} left room group {}", room.chat_id),
        )])
    }

    fn handle_message_send(&self, session_id: u64, message: ChatMessage) -> Vec<ServerAction> {
        let room_id = message.chat_id.clone();
        match MessageRouter::new(self.connections.registry()).route_message(session_id, message) {
            Ok(actions) => actions,
            Err(err) => vec![self.log(
                LogLevel::Error,
                format!("failed to route message from session {session_id} in {room_id}: {err}"),
            )],
        }
    }

    async fn handle_request_join(&self, request: RequestJoin) -> Vec<ServerAction> {
        let started = self.env.now();
        let result = self.coordinator.request_join(&request.chat_id, &request.user_id).await;
        let elapsed = self.env.now() - started;

        match result {
            Ok(notification) => {
                let mut actions = vec![self.log(
                    LogLevel::Info,
                    format!(
                        "request:join recorded: room {}, requester {} ({elapsed:?})",
                        request.chat_id, request.user_id
                    ),
                )];
                actions.extend(self.deliver(notification));
                actions
            },
            Err(err) => vec![self.coordinator_failure(
                Opcode::RequestJoin,
                &request.chat_id,
                &request.user_id,
                &err,
            )],
        }
    }

    async fn handle_request_respond(&self, response: RequestRespond) -> Vec<ServerAction> {
        let started = self.env.now();
        let result = self
            .coordinator
            .respond_to_request(&response.chat_id, &response.requester_id, response.accept)
            .await;
        let elapsed = self.env.now() - started;

        match result {
            Ok(notification) => {
                let mut actions = vec![self.log(
                    LogLevel::Info,
                    format!(
                        "request:respond resolved: room {}, requester {}, accept={} ({elapsed:?})",
                        response.chat_id, response.requester_id, response.accept
                    ),
                )];
                actions.extend(self.deliver(notification));
                actions
            },
            Err(err) => vec![self.coordinator_failure(
                Opcode::RequestRespond,
                &response.chat_id,
                &response.requester_id,
                &err,
            )],
        }
    }

    fn handle_ping(&self, session_id: u64, request_id: u32) -> Vec<ServerAction> {
        let mut header = FrameHeader::new(Opcode::Pong);
        header.set_request_id(request_id);

        match Payload::Pong(Pong::ok(self.env.wall_clock_millis())).into_frame(header) {
            Ok(frame) => vec![ServerAction::SendToSession { session_id, frame }],
            Err(err) => vec![self.log(LogLevel::Error, format!("failed to encode pong: {err}"))],
        }
    }

    /// Hand a coordinator notification to the router.
    fn deliver(&self, notification: Notification) -> Vec<ServerAction> {
        let Notification { recipient, payload } = notification;
        let event = payload.opcode();

        match MessageRouter::new(self.connections.registry()).notify_user(&recipient, payload) {
            Ok(actions) if actions.is_empty() => vec![self.log(
                LogLevel::Debug,
                format!("{recipient} offline, dropped {event}"),
            )],
            Ok(actions) => actions,
            Err(err) => vec![self.log(
                LogLevel::Error,
                format!("failed to encode {event} for {recipient}: {err}"),
            )],
        }
    }

    fn coordinator_failure(
        &self,
        event: Opcode,
        room_id: &vestibule_proto::RoomId,
        requester_id: &vestibule_proto::UserId,
        err: &CoordinatorError,
    ) -> ServerAction {
        let level = match err {
            CoordinatorError::Store(StoreError::Unavailable(_) | StoreError::Serialization(_)) => {
                LogLevel::Error
            },
            _ => LogLevel::Warn,
        };
        self.log(
            level,
            format!("{event} failed: room {room_id}, requester {requester_id}: {err}"),
        )
    }

    fn error_reply(
        &self,
        session_id: u64,
        request_id: u32,
        error: ErrorPayload,
    ) -> Vec<ServerAction> {
        let error_msg = error.message.clone();
        let mut header = FrameHeader::new(Opcode::Error);
        header.set_request_id(request_id);

        match Payload::Error(error).into_frame(header) {
            Ok(frame) => vec![ServerAction::SendToSession { session_id, frame }, self.log(
                LogLevel::Warn,
                format!("rejected frame from session {session_id}: {error_msg}"),
            )],
            Err(e) => vec![self.log(LogLevel::Error, format!("failed to encode error response: {e}"))],
        }
    }

    fn log(&self, level: LogLevel, message: String) -> ServerAction {
        ServerAction::Log { level, message, timestamp: self.env.wall_clock_millis() }
    }
}

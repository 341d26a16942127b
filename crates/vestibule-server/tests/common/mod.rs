//! Shared fixtures for relay integration tests.

#![allow(dead_code, clippy::disallowed_types)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use vestibule_core::Environment;
use vestibule_proto::{
    FrameHeader, Opcode, Payload, RoomId, UserId,
    payloads::{
        chat::{ChatMessage, RoomRef},
        request::{RequestJoin, RequestRespond},
        session::UserConnect,
    },
};
use vestibule_server::{
    DriverConfig, LogLevel, RoomStore, ServerAction, ServerDriver, ServerEvent,
};

/// Wall clock at tick zero (2023-11-14T22:13:20Z).
pub const EPOCH_MILLIS: u64 = 1_700_000_000_000;

/// Deterministic environment: a manual clock and a seeded ChaCha RNG.
#[derive(Clone)]
pub struct TestEnv {
    ticks: Arc<AtomicU64>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl TestEnv {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, millis: u64) {
        self.ticks.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::with_seed(42)
    }
}

impl Environment for TestEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        Duration::from_millis(self.ticks.load(Ordering::SeqCst))
    }

    fn wall_clock_millis(&self) -> u64 {
        EPOCH_MILLIS + self.ticks.load(Ordering::SeqCst)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

/// Driver plus helpers to speak to it as clients would.
pub struct Relay<S: RoomStore> {
    pub env: TestEnv,
    pub driver: ServerDriver<TestEnv, S>,
}

impl<S: RoomStore> Relay<S> {
    pub fn new(store: S, config: DriverConfig) -> Self {
        let env = TestEnv::default();
        let driver = ServerDriver::new(env.clone(), store, config);
        Self { env, driver }
    }

    pub fn store(&self) -> &S {
        self.driver.store()
    }

    /// Accept `session` and bind it to `user`.
    pub async fn connect(&mut self, session: u64, user: &str) -> Vec<ServerAction> {
        let mut actions = self
            .driver
            .process_event(ServerEvent::ConnectionAccepted { session_id: session })
            .await
            .unwrap();
        actions.extend(
            self.send(session, Payload::UserConnect(UserConnect { user_id: UserId::from(user) }))
                .await,
        );
        actions
    }

    pub async fn disconnect(&mut self, session: u64) -> Vec<ServerAction> {
        self.driver
            .process_event(ServerEvent::ConnectionClosed {
                session_id: session,
                reason: "client went away".to_string(),
            })
            .await
            .unwrap()
    }

    pub async fn send(&mut self, session: u64, payload: Payload) -> Vec<ServerAction> {
        let frame = payload.into_frame(FrameHeader::new(Opcode::Ping)).unwrap();
        self.driver
            .process_event(ServerEvent::FrameReceived { session_id: session, frame })
            .await
            .unwrap()
    }

    pub async fn join_group(&mut self, session: u64, room: &str) -> Vec<ServerAction> {
        self.send(session, Payload::ChatJoin(RoomRef { chat_id: RoomId::from(room) })).await
    }

    pub async fn request_join(&mut self, session: u64, room: &str, user: &str) -> Vec<ServerAction> {
        self.send(
            session,
            Payload::RequestJoin(RequestJoin {
                chat_id: RoomId::from(room),
                user_id: UserId::from(user),
            }),
        )
        .await
    }

    pub async fn respond(
        &mut self,
        session: u64,
        room: &str,
        requester: &str,
        accept: bool,
    ) -> Vec<ServerAction> {
        self.send(
            session,
            Payload::RequestRespond(RequestRespond {
                chat_id: RoomId::from(room),
                requester_id: UserId::from(requester),
                accept,
            }),
        )
        .await
    }

    pub async fn say(&mut self, session: u64, room: &str, text: &str) -> Vec<ServerAction> {
        self.send(session, Payload::MessageSend(ChatMessage::new(room).with_text("text", text)))
            .await
    }
}

/// Decoded frames sent by the driver, with their target session.
pub fn deliveries(actions: &[ServerAction]) -> Vec<(u64, Payload)> {
    actions
        .iter()
        .filter_map(|action| match action {
            ServerAction::SendToSession { session_id, frame } => {
                Some((*session_id, Payload::from_frame(frame).unwrap()))
            },
            _ => None,
        })
        .collect()
}

/// Log messages at exactly `level`.
pub fn logs(actions: &[ServerAction], level: LogLevel) -> Vec<String> {
    actions
        .iter()
        .filter_map(|action| match action {
            ServerAction::Log { level: l, message, .. } if *l == level => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Single-threaded runtime for driving async code from proptest bodies.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

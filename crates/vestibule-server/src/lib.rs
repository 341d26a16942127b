//! Vestibule relay server.
//!
//! Stateful relay that binds client sessions to user identities, fans chat
//! messages out to room groups, and runs the join request handshake between a
//! requester and a room's creator.
//!
//! # Architecture
//!
//! [`ServerDriver`] holds all relay logic behind a Sans-IO interface: the
//! runtime feeds it [`ServerEvent`]s and executes the [`ServerAction`]s it
//! returns. [`Server`] is that runtime, over Quinn QUIC and Tokio.
//!
//! # Components
//!
//! - [`SessionRegistry`]: session to identity and room group tables
//! - [`ConnectionManager`]: the registry's only writer
//! - [`RequestCoordinator`]: join request state machine over a [`RoomStore`]
//! - [`MessageRouter`]: group fan-out and user-address notifications
//! - [`Server`]: production runtime executing driver actions
//! - [`SystemEnv`]: production environment (real time, OS RNG)

#![forbid(unsafe_code)]

mod coordinator;
mod driver;
mod error;
mod lifecycle;
mod registry;
mod router;
mod server_error;
pub mod storage;
mod system_env;
mod transport;

use std::{collections::HashMap, future::Future, net::SocketAddr, path::PathBuf, sync::Arc};

pub use coordinator::{CoordinatorError, Notification, ReRequestPolicy, RequestCoordinator};
pub use driver::{
    LogLevel, MembershipPolicy, ServerAction, ServerConfig as DriverConfig, ServerDriver,
    ServerEvent,
};
pub use error::ServerError;
pub use lifecycle::{ConnectError, ConnectionManager, ReleasedSession};
pub use registry::{BindOutcome, RegistryError, SessionInfo, SessionRegistry};
pub use router::MessageRouter;
pub use server_error::ServerError as DriverError;
pub use storage::{ChaoticStore, MemoryStore, RedbStore, RoomStore, StoreError};
pub use system_env::SystemEnv;
use tokio::sync::{Mutex, RwLock};
pub use transport::{QuinnConnection, QuinnTransport, TlsIdentity};
use vestibule_core::Room;
use vestibule_proto::{Frame, FrameHeader};

type SharedDriver<S> = Arc<Mutex<ServerDriver<SystemEnv, S>>>;

/// Per-connection transport handles, keyed by session id.
struct SharedState {
    /// Session ID → QUIC connection (for closing)
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    /// Session ID → the single outbound stream, so frames to one session
    /// arrive in the order they were sent
    outbound_streams: RwLock<HashMap<u64, Mutex<quinn::SendStream>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<PathBuf>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<PathBuf>,
    /// Rooms created at startup. Existing rooms are left untouched.
    pub seed_rooms: Vec<Room>,
    /// Driver configuration (limits, policies)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            seed_rooms: Vec::new(),
            driver: DriverConfig::default(),
        }
    }
}

/// Production relay server.
///
/// Wraps [`ServerDriver`] with Quinn QUIC transport and [`SystemEnv`].
pub struct Server<S: RoomStore> {
    driver: ServerDriver<SystemEnv, S>,
    transport: QuinnTransport,
}

impl<S: RoomStore> Server<S> {
    /// Seed rooms into `store` and bind the QUIC endpoint.
    ///
    /// # Errors
    ///
    /// - `ServerError::Store` if a seed room cannot be written
    /// - `ServerError::Config` / `ServerError::Transport` from binding
    pub async fn bind(config: ServerRuntimeConfig, store: S) -> Result<Self, ServerError> {
        let created = seed_rooms(&store, &config.seed_rooms).await?;
        if !config.seed_rooms.is_empty() {
            tracing::info!(created, requested = config.seed_rooms.len(), "seeded rooms");
        }

        let identity = TlsIdentity::from_paths(config.cert_path, config.key_path);
        let transport = QuinnTransport::bind(&config.bind_address, &identity)?;

        let driver = ServerDriver::new(SystemEnv::new(), store, config.driver);
        Ok(Self { driver, transport })
    }

    /// Local address the server is bound to.
    ///
    /// # Errors
    ///
    /// - `ServerError::Transport` if the socket address cannot be read
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Accept connections until the endpoint closes.
    ///
    /// # Errors
    ///
    /// - `ServerError::Transport` if the local address cannot be read
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves, then close the endpoint.
    ///
    /// # Errors
    ///
    /// - `ServerError::Transport` if the local address cannot be read
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        tracing::info!("relay listening on {}", self.transport.local_addr()?);

        let Self { driver, transport } = self;
        let driver: SharedDriver<S> = Arc::new(Mutex::new(driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound_streams: RwLock::new(HashMap::new()),
        });

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutting down");
                    transport.close();
                    return Ok(());
                },
                accepted = transport.accept() => match accepted {
                    Ok(Some(conn)) => {
                        let driver = Arc::clone(&driver);
                        let shared = Arc::clone(&shared);
                        tokio::spawn(async move {
                            let remote = conn.remote_addr();
                            if let Err(e) = handle_connection(conn, driver, shared).await {
                                tracing::error!(%remote, "connection error: {e}");
                            }
                        });
                    },
                    Ok(None) => return Ok(()),
                    Err(e) => tracing::warn!("accept error: {e}"),
                },
            }
        }
    }
}

/// Create every room in `rooms` that does not exist yet.
///
/// Returns how many were created.
///
/// # Errors
///
/// - `StoreError` from the first failed write
pub async fn seed_rooms<S: RoomStore>(store: &S, rooms: &[Room]) -> Result<usize, StoreError> {
    let mut created = 0;
    for room in rooms {
        if store.create_room(room).await? {
            created += 1;
        } else {
            tracing::debug!(room = %room.room_id, "seed room already exists");
        }
    }
    Ok(created)
}

async fn handle_connection<S: RoomStore>(
    conn: QuinnConnection,
    driver: SharedDriver<S>,
    shared: Arc<SharedState>,
) -> Result<(), ServerError> {
    let outbound = conn.open_uni().await?;

    // Allocation and acceptance share one lock so the id cannot be taken in
    // between.
    let (session_id, actions) = {
        let mut driver = driver.lock().await;
        let session_id = driver.allocate_session_id();
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id }).await?;
        (session_id, actions)
    };
    tracing::debug!(session_id, remote = %conn.remote_addr(), "new connection");

    let refusal = actions.iter().find_map(|a| match a {
        ServerAction::CloseConnection { session_id: s, reason } if *s == session_id => {
            Some(reason.clone())
        },
        _ => None,
    });
    if let Some(reason) = refusal {
        execute_actions(actions, &shared).await;
        conn.close(&reason);
        return Ok(());
    }

    shared.connections.write().await.insert(session_id, conn.clone());
    shared.outbound_streams.write().await.insert(session_id, Mutex::new(outbound));
    execute_actions(actions, &shared).await;

    while let Ok((send, recv)) = conn.accept_bi().await {
        // Replies travel on the outbound uni stream.
        drop(send);

        let driver = Arc::clone(&driver);
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            if let Err(e) = handle_stream(session_id, recv, driver, &shared).await {
                tracing::debug!(session_id, "stream closed: {e}");
            }
        });
    }

    shared.connections.write().await.remove(&session_id);
    shared.outbound_streams.write().await.remove(&session_id);

    let actions = driver
        .lock()
        .await
        .process_event(ServerEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_string(),
        })
        .await?;
    execute_actions(actions, &shared).await;

    Ok(())
}

/// Read frames off one client stream until it ends or a header is invalid.
async fn handle_stream<S: RoomStore>(
    session_id: u64,
    mut recv: quinn::RecvStream,
    driver: SharedDriver<S>,
    shared: &SharedState,
) -> Result<(), ServerError> {
    let mut head = [0u8; FrameHeader::SIZE];

    loop {
        if let Err(e) = recv.read_exact(&mut head).await {
            return Err(ServerError::Transport(e.to_string()));
        }

        let header = *FrameHeader::from_bytes(&head)?;
        let mut payload = vec![0u8; header.payload_size() as usize];
        recv.read_exact(&mut payload)
            .await
            .map_err(|e| ServerError::Transport(format!("payload read failed: {e}")))?;

        let frame = Frame::new(header, payload);
        let result =
            driver.lock().await.process_event(ServerEvent::FrameReceived { session_id, frame }).await;

        match result {
            Ok(actions) => execute_actions(actions, shared).await,
            Err(DriverError::SessionNotFound(_)) => {
                return Err(ServerError::Internal(format!("session {session_id} already released")));
            },
            Err(e) => tracing::warn!(session_id, "frame processing error: {e}"),
        }
    }
}

/// Execute driver actions. Failures are per-session and only logged.
async fn execute_actions(actions: Vec<ServerAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, frame } => {
                let bytes = match frame.to_vec() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!(session_id, "failed to encode frame: {e}");
                        continue;
                    },
                };

                let streams = shared.outbound_streams.read().await;
                let Some(stream) = streams.get(&session_id) else {
                    tracing::debug!(session_id, "send to departed session dropped");
                    continue;
                };
                if let Err(e) = stream.lock().await.write_all(&bytes).await {
                    tracing::warn!(session_id, "write failed: {e}");
                }
            },

            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!(session_id, "closing connection: {reason}");
                if let Some(conn) = shared.connections.write().await.remove(&session_id) {
                    conn.close(&reason);
                }
            },

            ServerAction::Log { level, message, .. } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

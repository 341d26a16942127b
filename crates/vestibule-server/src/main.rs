//! Vestibule relay binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory store, self-signed certificate, one seeded room
//! vestibule-server --bind 0.0.0.0:4433 --room r1=alice
//!
//! # Durable store and real certificate
//! vestibule-server --db rooms.redb --cert cert.pem --key key.pem
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vestibule_core::Room;
use vestibule_server::{
    DriverConfig, MembershipPolicy, MemoryStore, ReRequestPolicy, RedbStore, RoomStore, Server,
    ServerRuntimeConfig,
};

/// Vestibule relay server
#[derive(Parser, Debug)]
#[command(name = "vestibule-server")]
#[command(about = "Session relay with room join-request coordination")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<PathBuf>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level, overridden by RUST_LOG (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Redb database file; rooms and requests are kept in memory without it
    #[arg(long)]
    db: Option<PathBuf>,

    /// Room to create at startup, as `<room>=<creator>` (repeatable)
    #[arg(long = "room", value_parser = parse_room)]
    rooms: Vec<Room>,

    /// Refuse a join request while the same user's previous one is pending
    #[arg(long)]
    reject_duplicate_requests: bool,

    /// Only the creator and accepted participants may join a room's group
    #[arg(long)]
    participants_only: bool,
}

impl Args {
    fn runtime_config(&self) -> ServerRuntimeConfig {
        let re_request = if self.reject_duplicate_requests {
            ReRequestPolicy::RejectWhilePending
        } else {
            ReRequestPolicy::Overwrite
        };
        let membership = if self.participants_only {
            MembershipPolicy::ParticipantsOnly
        } else {
            MembershipPolicy::Open
        };

        ServerRuntimeConfig {
            bind_address: self.bind.clone(),
            cert_path: self.cert.clone(),
            key_path: self.key.clone(),
            seed_rooms: self.rooms.clone(),
            driver: DriverConfig { max_connections: self.max_connections, re_request, membership },
        }
    }
}

fn parse_room(spec: &str) -> Result<Room, String> {
    let (room, creator) =
        spec.split_once('=').ok_or_else(|| format!("expected <room>=<creator>, got '{spec}'"))?;
    if room.is_empty() || creator.is_empty() {
        return Err(format!("room and creator must be non-empty in '{spec}'"));
    }
    Ok(Room::new(room, creator))
}

async fn serve<S: RoomStore>(
    config: ServerRuntimeConfig,
    store: S,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(config, store).await?;
    tracing::info!("listening on {}", server.local_addr()?);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = args.runtime_config();
    tracing::info!(
        bind = %config.bind_address,
        re_request = ?config.driver.re_request,
        membership = ?config.driver.membership,
        "vestibule relay starting"
    );

    match &args.db {
        Some(path) => {
            tracing::info!(path = %path.display(), "using redb store");
            serve(config, RedbStore::open(path)?).await
        },
        None => {
            tracing::warn!("no --db given, rooms and requests are lost on exit");
            serve(config, MemoryStore::new()).await
        },
    }
}

//! Session-level payloads: identity binding and liveness.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// `user:connect` body. Binds the sending session to `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConnect {
    /// Identity to bind
    pub user_id: UserId,
}

/// Reply to `ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Process status, `"ok"` while serving
    pub status: String,
    /// Server wall-clock time (Unix millis)
    pub timestamp: u64,
}

impl Pong {
    /// Healthy reply stamped with `timestamp`.
    #[must_use]
    pub fn ok(timestamp: u64) -> Self {
        Self { status: "ok".to_string(), timestamp }
    }
}

//! Join request handshake payloads.
//!
//! A non-member sends `request:join`; the room's creator is told via
//! `request:received`, answers with `request:respond`, and the requester
//! learns the outcome via `request:response`.

use serde::{Deserialize, Serialize};

use crate::{RequestStatus, RoomId, UserId};

/// `request:join` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestJoin {
    /// Room to be admitted to
    pub chat_id: RoomId,
    /// Requesting user
    pub user_id: UserId,
}

/// `request:respond` body, sent by the room creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRespond {
    /// Room the request targets
    pub chat_id: RoomId,
    /// User whose request is being resolved
    pub requester_id: UserId,
    /// `true` to admit, `false` to refuse
    pub accept: bool,
}

/// `request:received` body, delivered to the creator's user address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReceived {
    /// Room the request targets
    pub chat_id: RoomId,
    /// User asking to join
    pub requester_id: UserId,
}

/// `request:response` body, delivered to the requester's user address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    /// Room the request targeted
    pub chat_id: RoomId,
    /// Outcome, `accepted` or `rejected`
    pub status: RequestStatus,
}

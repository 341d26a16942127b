//! Vestibule domain model.
//!
//! Rooms, join requests and the rule that governs a request's lifecycle
//! (`pending → accepted | rejected`, exactly once). Everything here is pure:
//! persistence and transport live in `vestibule-server`, time and randomness
//! come in through [`Environment`].

#![forbid(unsafe_code)]

pub mod env;
pub mod error;
pub mod room;

pub use env::Environment;
pub use error::RequestError;
pub use room::{JoinRequest, Room};

//! Connection session management (server side).
//!
//! Lobbies, per-connection handles, admission, inbound payload handling
//! and fan-out of entity ops.

mod admission;
mod dispatch;
mod lobby;
mod manager;

pub use admission::{Admission, OpenLobbies, Refused, UpgradeRequest};
pub use dispatch::PayloadHandler;
pub use lobby::{Handle, HandleFields, HandleId, Lobby, Outbound};
pub use manager::{Admitted, HandleEvent, SessionManager, SessionSettings};

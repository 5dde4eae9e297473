//! lobbysync client: transport state machine and entity mirror.
//!
//! [`ClientSocket`] keeps one connection to a lobby endpoint alive
//! (reconnecting after transient closes) and correlates requests with their
//! answers. [`EntityMirror`] rides on a socket and keeps a read-only replica
//! of the lobby's shared entities, rebuilt by a full sync on every
//! reconnection.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod mirror;
pub mod options;
pub mod socket;
pub mod transport;

pub use mirror::{EntityMirror, EntityUpdate, UpdateKind};
pub use options::ClientOptions;
pub use socket::{ClientSocket, ConnectionStatus};
pub use transport::{Connector, Outgoing, TransportEvent, TransportLink, WsConnector};

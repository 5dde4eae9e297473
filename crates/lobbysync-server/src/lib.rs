//! Lobby sync server library entry.
//!
//! Shared entities (objects and lists) live in lobbies; every mutation is
//! replicated to the lobby's connected handles as an entity op. This crate
//! wires the transport, the session manager and the entity model together.
//! It is consumed by the demo binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod entities;
pub mod router;
pub mod session;
pub mod transport;

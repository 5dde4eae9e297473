//! lobbysync core: wire protocol, correlation, event channels and errors.
//!
//! This crate defines the frame/payload contracts and the entity operation
//! vocabulary shared by the server (authoritative entities) and the client
//! (entity mirror). It carries no transport dependency so both sides, and
//! test doubles, can reuse it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! Malformed frames surface as `SyncError::BadRequest` instead of crashing
//! the connection loop.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod correlation;
pub mod emitter;
pub mod error;
pub mod guard;
pub mod protocol;

pub use correlation::{generate_uid, short_uid, PendingRequest, PendingRequests};
pub use emitter::{Emitter, ListenerId};
pub use error::{ErrorCode, Result, SyncError};

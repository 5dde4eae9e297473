//! Wire protocol: frames, payloads and the entity operation vocabulary.
//!
//! Every frame on the connection is a text frame and is one of:
//! - a keepalive (`@PING-<uid>`), discarded by the receiver,
//! - a close-with-reason (`@CLOSE:<reason>`), sent right before the server
//!   terminates a connection,
//! - a JSON [`Payload`](payload::Payload) `{ a, t, u?, d? }`.
//!
//! Parsers never panic: malformed input surfaces as `SyncError::BadRequest`.

pub mod entity;
pub mod payload;

pub use entity::{item_ref, parse_item_ref, Action, EntityId, EntityKind, EntityOp, OpName};
pub use payload::{Frame, Payload};

//! Transport layer (WebSocket).
//!
//! Exposes the WS upgrade handler and the codec that decodes each message
//! once before it reaches the session manager.

pub mod codec;
pub mod ws;

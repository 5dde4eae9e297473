//! Decode-once codec for the transport layer.
//!
//! - Text frames => [`Frame`] (keepalive, close-with-reason or payload)
//! - Binary frames are not part of the protocol and are rejected
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use lobbysync_core::{
    error::{Result, SyncError},
    protocol::Frame,
};

#[derive(Debug)]
pub enum Inbound {
    Frame(Frame),
    Ping(Vec<u8>),
    Pong,
    Close,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => Ok(Inbound::Frame(Frame::decode(&s)?)),
        Message::Binary(b) => Err(SyncError::BadRequest(format!(
            "binary frames are not supported ({} bytes)",
            b.len()
        ))),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(_) => Ok(Inbound::Pong),
        Message::Close(_) => Ok(Inbound::Close),
    }
}

//! Payload envelope and frame codec.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::correlation::generate_uid;
use crate::error::{Result, SyncError};

/// Client -> server: push every entity snapshot to me, then answer `@OK`.
pub const SYNC_REQUEST: &str = "@SE";
/// Positive answer to [`SYNC_REQUEST`].
pub const SYNC_OK: &str = "@OK";
/// Prefix of keepalive frames.
pub const KEEPALIVE_MARKER: &str = "@PING";
/// Prefix of close-with-reason frames.
pub const CLOSE_MARKER: &str = "@CLOSE";

/// One structured message on the connection.
///
/// Field names on the wire are single letters (`a`, `t`, `u`, `d`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// App namespace.
    #[serde(rename = "a", default, deserialize_with = "null_as_zero")]
    pub app_id: u32,
    /// Control tag (`@SE`, `@OK`...) or entity tag (`@SO`, `@SL`) or an
    /// application message type.
    #[serde(rename = "t")]
    pub msg_type: String,
    /// Present on a request awaiting exactly one answer, and on that answer.
    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Message body; `null` when absent.
    #[serde(rename = "d", default)]
    pub data: Value,
}

fn null_as_zero<'de, D>(de: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(de)?.unwrap_or_default())
}

impl Payload {
    pub fn new(app_id: u32, msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            app_id,
            msg_type: msg_type.into(),
            correlation_id: None,
            data,
        }
    }

    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Build the answer to this payload: same app/type/correlation id, new data.
    pub fn answer(&self, data: Value) -> Self {
        Self {
            app_id: self.app_id,
            msg_type: self.msg_type.clone(),
            correlation_id: self.correlation_id.clone(),
            data,
        }
    }

    pub fn is_sync_request(&self) -> bool {
        self.msg_type == SYNC_REQUEST
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SyncError::Internal(format!("payload encode failed: {e}")))
    }

    pub fn decode(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| SyncError::BadRequest(format!("invalid payload json: {e}")))
    }
}

/// Decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Keepalive; carries the full raw frame.
    Keepalive(String),
    /// Peer is about to terminate the connection.
    Close { reason: Option<String> },
    Payload(Payload),
}

impl Frame {
    pub fn decode(s: &str) -> Result<Self> {
        if s.starts_with(KEEPALIVE_MARKER) {
            return Ok(Frame::Keepalive(s.to_owned()));
        }
        if let Some(rest) = s.strip_prefix(CLOSE_MARKER) {
            let reason = rest.strip_prefix(':').unwrap_or(rest).trim();
            let reason = (!reason.is_empty()).then(|| reason.to_owned());
            return Ok(Frame::Close { reason });
        }
        Payload::decode(s).map(Frame::Payload)
    }

    pub fn encode(&self) -> Result<String> {
        match self {
            Frame::Keepalive(raw) => Ok(raw.clone()),
            Frame::Close { reason } => Ok(close_frame(reason.as_deref())),
            Frame::Payload(p) => p.encode(),
        }
    }
}

/// Fresh keepalive frame (`@PING-<uid>`).
pub fn keepalive_frame() -> String {
    format!("{KEEPALIVE_MARKER}-{}", generate_uid())
}

/// Close-with-reason frame.
pub fn close_frame(reason: Option<&str>) -> String {
    match reason {
        Some(r) if !r.is_empty() => format!("{CLOSE_MARKER}:{r}"),
        _ => CLOSE_MARKER.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn null_app_id_reads_as_zero() {
        let p = Payload::decode(r#"{"a":null,"t":"@SE","u":"x1"}"#).unwrap();
        assert_eq!(p.app_id, 0);
        assert!(p.is_sync_request());
        assert_eq!(p.data, Value::Null);
    }

    #[test]
    fn answer_keeps_correlation() {
        let req = Payload::new(3, "score", json!({"n": 1})).with_correlation("abc");
        let ans = req.answer(json!(42));
        assert_eq!(ans.correlation_id.as_deref(), Some("abc"));
        assert_eq!(ans.app_id, 3);
        assert_eq!(ans.msg_type, "score");
    }

    #[test]
    fn close_reason_is_optional() {
        assert_eq!(Frame::decode("@CLOSE").unwrap(), Frame::Close { reason: None });
        assert_eq!(
            Frame::decode(&close_frame(Some("lobby closed"))).unwrap(),
            Frame::Close { reason: Some("lobby closed".into()) }
        );
    }

    #[test]
    fn keepalive_frames_are_unique() {
        let a = keepalive_frame();
        let b = keepalive_frame();
        assert_ne!(a, b);
        assert!(matches!(Frame::decode(&a).unwrap(), Frame::Keepalive(_)));
    }
}

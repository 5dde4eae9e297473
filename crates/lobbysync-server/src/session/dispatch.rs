use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use lobbysync_core::protocol::Payload;

use super::{Handle, Lobby};

/// Application payload listener.
///
/// Returning `Some` claims the answer to a correlated request. At most one
/// handler may answer a given payload.
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    async fn on_payload(
        &self,
        payload: &Payload,
        lobby: &Arc<Lobby>,
        handle: &Arc<Handle>,
    ) -> Option<Value>;
}

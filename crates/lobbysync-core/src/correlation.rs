//! Request/response correlation.
//!
//! A request frame carries a fresh id in `u`; the peer echoes it on exactly
//! one answer. The pending table maps ids to one-shot completions and every
//! entry leaves the table on answer or timeout, whichever comes first.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Unique opaque id (32 hex chars).
pub fn generate_uid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Short random id, used for auto-generated entity keys.
pub fn short_uid(len: usize) -> String {
    let mut s = generate_uid();
    s.truncate(len.clamp(1, 32));
    s
}

/// Pending correlated requests: id -> completion.
pub struct PendingRequests<T> {
    waiting: DashMap<String, oneshot::Sender<T>>,
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self {
            waiting: DashMap::new(),
        }
    }
}

impl<T> PendingRequests<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id and its completion slot.
    pub fn register(&self) -> PendingRequest<T> {
        let id = generate_uid();
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(id.clone(), tx);
        PendingRequest { id, rx }
    }

    /// Complete the request `id`. Returns false for unknown or expired ids.
    pub fn resolve(&self, id: &str, value: T) -> bool {
        match self.waiting.remove(id) {
            Some((_, tx)) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.waiting.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    fn forget(&self, id: &str) {
        self.waiting.remove(id);
    }
}

/// A registered request waiting for its answer.
pub struct PendingRequest<T> {
    id: String,
    rx: oneshot::Receiver<T>,
}

impl<T> PendingRequest<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the answer; the table entry is removed in every outcome.
    pub async fn wait(self, table: &PendingRequests<T>, timeout: Duration) -> Result<T> {
        let PendingRequest { id, rx } = self;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => {
                table.forget(&id);
                Err(SyncError::Internal(format!("request {id} dropped")))
            }
            Err(_) => {
                table.forget(&id);
                tracing::debug!(%id, ?timeout, "request timed out");
                Err(SyncError::Timeout(id))
            }
        }
    }

    /// Give up without waiting (e.g. the send itself failed).
    pub fn abandon(self, table: &PendingRequests<T>) {
        table.forget(&self.id);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn answer_resolves_and_clears() {
        let table = PendingRequests::<u32>::new();
        let req = table.register();
        let id = req.id().to_owned();
        assert!(table.contains(&id));

        assert!(table.resolve(&id, 7));
        assert_eq!(req.wait(&table, Duration::from_secs(1)).await.unwrap(), 7);
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rejects_and_late_answer_is_ignored() {
        let table = PendingRequests::<u32>::new();
        let req = table.register();
        let id = req.id().to_owned();

        let err = req.wait(&table, Duration::from_secs(10)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(table.is_empty());
        assert!(!table.resolve(&id, 1));
    }

    #[test]
    fn short_uids() {
        assert_eq!(short_uid(8).len(), 8);
        assert_ne!(generate_uid(), generate_uid());
    }
}

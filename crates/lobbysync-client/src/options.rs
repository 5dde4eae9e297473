use std::time::Duration;

use lobbysync_core::error::{Result, SyncError};

/// Highest accepted log level: 0 silent, 1 payloads, 2 raw frames.
pub const MAX_LOG_LEVEL: u8 = 2;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// `ws://` or `wss://` address, lobby path included.
    pub endpoint: String,
    pub log_level: u8,
    /// Wait before a reconnection attempt; zero disables reconnection.
    pub reconnect_delay: Duration,
    /// How long a correlated request waits for its answer.
    pub request_timeout: Duration,
}

impl ClientOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            log_level: 0,
            reconnect_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.endpoint.starts_with("ws://") && !self.endpoint.starts_with("wss://") {
            return Err(SyncError::BadRequest(format!(
                "endpoint must use ws:// or wss://: {}",
                self.endpoint
            )));
        }
        check_log_level(self.log_level)?;
        if self.request_timeout.is_zero() {
            return Err(SyncError::BadRequest("request_timeout must be > 0".into()));
        }
        Ok(())
    }
}

pub(crate) fn check_log_level(level: u8) -> Result<()> {
    if level > MAX_LOG_LEVEL {
        return Err(SyncError::BadRequest(format!(
            "log level must be between 0 and {MAX_LOG_LEVEL}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = ClientOptions::new("ws://localhost:8080/ws/main");
        assert_eq!(o.reconnect_delay, Duration::from_secs(1));
        assert_eq!(o.request_timeout, Duration::from_secs(10));
        assert!(o.validate().is_ok());
    }

    #[test]
    fn endpoint_scheme_is_checked() {
        assert!(ClientOptions::new("http://localhost").validate().is_err());
        assert!(ClientOptions::new("wss://example.org/ws/a").validate().is_ok());
    }

    #[test]
    fn log_level_is_bounded() {
        let mut o = ClientOptions::new("ws://localhost");
        o.log_level = 3;
        assert!(o.validate().is_err());
    }
}

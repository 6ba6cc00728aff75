use std::time::Duration;

use crate::error::{Result, SyncError};

/// Storage key holding the ordered pending queue
pub const DEFAULT_PENDING_KEY: &str = "sync_queue.pending";

/// Storage key holding tasks dropped after exhausting retries
pub const DEFAULT_DEAD_LETTER_KEY: &str = "sync_queue.dead_letters";

/// Pending-operation queue configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Failed attempts after which a task is dropped
    pub max_attempts: u32,

    /// Upper bound for a single apply call during a drain
    pub apply_timeout: Duration,

    /// Periodic safety-net drain while online; `None` disables it
    pub drain_interval: Option<Duration>,

    /// Drain once when the background trigger starts and the device is online
    pub drain_on_start: bool,

    pub pending_key: String,

    pub dead_letter_key: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            apply_timeout: Duration::from_secs(30),
            drain_interval: None,
            drain_on_start: true,
            pending_key: DEFAULT_PENDING_KEY.to_string(),
            dead_letter_key: DEFAULT_DEAD_LETTER_KEY.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_apply_timeout(mut self, timeout: Duration) -> Self {
        self.apply_timeout = timeout;
        self
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = Some(interval);
        self
    }

    pub fn with_drain_on_start(mut self, enabled: bool) -> Self {
        self.drain_on_start = enabled;
        self
    }

    /// Override both storage keys, e.g. to keep one queue per signed-in user
    pub fn with_storage_keys(
        mut self,
        pending_key: impl Into<String>,
        dead_letter_key: impl Into<String>,
    ) -> Self {
        self.pending_key = pending_key.into();
        self.dead_letter_key = dead_letter_key.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.apply_timeout.is_zero() {
            return Err(SyncError::Config(
                "apply_timeout must be greater than zero".to_string(),
            ));
        }

        if matches!(self.drain_interval, Some(interval) if interval.is_zero()) {
            return Err(SyncError::Config(
                "drain_interval must be greater than zero when set".to_string(),
            ));
        }

        if self.pending_key.is_empty() || self.dead_letter_key.is_empty() {
            return Err(SyncError::Config("storage keys cannot be empty".to_string()));
        }

        if self.pending_key == self.dead_letter_key {
            return Err(SyncError::Config(
                "pending and dead-letter keys must differ".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.apply_timeout, Duration::from_secs(30));
        assert_eq!(config.drain_interval, None);
        assert_eq!(config.pending_key, "sync_queue.pending");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SyncConfig::default().with_max_attempts(0).validate().is_err());
        assert!(SyncConfig::default()
            .with_apply_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SyncConfig::default()
            .with_drain_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SyncConfig::default()
            .with_storage_keys("same", "same")
            .validate()
            .is_err());
    }
}

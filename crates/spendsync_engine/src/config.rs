//! Configuration for the sync engine.

use std::time::Duration;

/// Default background sync interval.
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Default bound on a single push or pull.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server base URL (e.g., "http://localhost:5000").
    pub server_url: String,
    /// Interval between background syncs.
    pub sync_interval: Duration,
    /// Bound on each push and each pull.
    pub timeout: Duration,
    /// Whether the scheduler syncs once as soon as it starts.
    pub initial_sync: bool,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            initial_sync: true,
        }
    }

    /// Sets the background sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the push/pull timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables the startup sync.
    pub fn with_initial_sync(mut self, enabled: bool) -> Self {
        self.initial_sync = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://localhost:5000")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://sync.example.com")
            .with_sync_interval(Duration::from_secs(5))
            .with_timeout(Duration::from_millis(250))
            .with_initial_sync(false);

        assert_eq!(config.server_url, "https://sync.example.com");
        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(!config.initial_sync);
    }

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.initial_sync);
    }
}

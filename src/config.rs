//! Destination store configuration.

use std::{path::PathBuf, time::Duration};

pub const DEFAULT_STORE_ROOT: &str = "csv_landing_store";
pub const DEFAULT_NAMESPACE: &str = "csv_demo";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one SQLite database per namespace plus the lock files.
    pub root: PathBuf,
    /// Upper bound on any wait for a store lock, including the resolution lock.
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("_locks")
    }
}

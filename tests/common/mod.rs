#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use csv_landing::{config::StoreConfig, store::SqliteStore};
use tempfile::{TempDir, tempdir};

/// Scratch directory holding upload files and a store root.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store_root(&self) -> PathBuf {
        self.temp_dir.path().join("store")
    }

    /// Opens a fresh handle on the workspace store, as an independent
    /// request handler would.
    pub fn store(&self) -> SqliteStore {
        let config =
            StoreConfig::new(self.store_root()).with_busy_timeout(Duration::from_secs(10));
        SqliteStore::open(config).expect("open store")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}

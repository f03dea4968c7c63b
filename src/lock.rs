//! Store-scoped advisory locks that serialize table resolution.
//!
//! A lock is identified by a string key (`namespace.base_name`) which is
//! hashed into a stable 64-bit id. The lock lives exactly as long as the
//! `body` closure: it is released when the body returns, fails, or unwinds.

use sha2::{Digest, Sha256};

use crate::error::UploadError;

pub trait AdvisoryLock {
    fn with_exclusive_lock<T, F>(&self, key: &str, body: F) -> Result<T, UploadError>
    where
        F: FnOnce() -> Result<T, UploadError>;
}

pub fn lock_key(namespace: &str, base_name: &str) -> String {
    format!("{namespace}.{base_name}")
}

/// First eight bytes of the key's SHA-256 digest, as a signed id.
pub fn lock_id(key: &str) -> i64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(head)
}

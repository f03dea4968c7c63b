//! Error taxonomy for a single upload.
//!
//! Every failure aborts the whole request. [`UploadError::fault`] tells the
//! caller whether the request itself was bad ([`Fault::Client`]) or the store
//! let it down ([`Fault::Server`]); only the latter is worth resubmitting.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Client,
    Server,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid upload: {0}")]
    Validation(String),

    #[error("malformed CSV payload: {0}")]
    MalformedInput(String),

    #[error("catalog unavailable while inspecting {namespace}.{table}: {source}")]
    CatalogUnavailable {
        namespace: String,
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A resolution lock, or the namespace write lock a reservation needs,
    /// stayed held for the whole busy timeout.
    #[error("timed out after {waited:?} waiting for store lock '{key}'")]
    LockTimeout { key: String, waited: Duration },

    #[error("could not acquire resolution lock '{key}': {reason}")]
    LockUnavailable { key: String, reason: String },

    #[error("no free fork name for '{base}' after {attempts} attempts")]
    ForkNamesExhausted { base: String, attempts: usize },

    #[error("load into {namespace}.{table} failed: {message}")]
    LoadFailure {
        namespace: String,
        table: String,
        message: String,
    },
}

impl UploadError {
    pub fn fault(&self) -> Fault {
        match self {
            UploadError::Validation(_) | UploadError::MalformedInput(_) => Fault::Client,
            UploadError::CatalogUnavailable { .. }
            | UploadError::LockTimeout { .. }
            | UploadError::LockUnavailable { .. }
            | UploadError::ForkNamesExhausted { .. }
            | UploadError::LoadFailure { .. } => Fault::Server,
        }
    }

    pub(crate) fn catalog(namespace: &str, table: &str, source: rusqlite::Error) -> Self {
        UploadError::CatalogUnavailable {
            namespace: namespace.to_string(),
            table: table.to_string(),
            source,
        }
    }

    pub(crate) fn load(namespace: &str, table: &str, message: impl Into<String>) -> Self {
        UploadError::LoadFailure {
            namespace: namespace.to_string(),
            table: table.to_string(),
            message: message.into(),
        }
    }
}

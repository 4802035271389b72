//! Error types
//!
//! One enum per layer: `StoreError` for the metadata store, `FsError` for the
//! node/handle layer (mapped to errno at the FUSE boundary), and `ApiError` for
//! configuration, CLI and mounting.

use sled::transaction::UnabortableTransactionError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Metadata store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open metadata store at {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },

    #[error("Metadata store error: {0}")]
    Sled(#[from] sled::Error),

    /// A transactional read or write was interrupted; sled retries on conflict.
    #[error("Transaction interrupted: {0:?}")]
    Interrupted(UnabortableTransactionError),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Key {key:?} in bucket {bucket} holds a sub-bucket, not a record")]
    IncompatibleValue { bucket: String, key: String },

    #[error("Invalid bucket or key name: {0:?}")]
    InvalidName(String),

    #[error("Corrupt store entry: {0}")]
    Corrupt(String),

    #[error("Record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<UnabortableTransactionError> for StoreError {
    fn from(err: UnabortableTransactionError) -> Self {
        StoreError::Interrupted(err)
    }
}

/// Filesystem operation failures
#[derive(Debug, Error)]
pub enum FsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Entry unreadable: {0}")]
    Unreadable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Tag rewrite failed for {path:?}: {message}")]
    Tagging { path: PathBuf, message: String },

    #[error("{name} would grow to {size} bytes (limit {limit})")]
    TooLarge { name: String, size: u64, limit: u64 },
}

impl FsError {
    /// POSIX error code reported to the kernel.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::PermissionDenied(_) => libc::EPERM,
            FsError::TooLarge { .. } => libc::EFBIG,
            FsError::Io(err) if err.kind() == io::ErrorKind::NotFound => libc::ENOENT,
            FsError::Io(err) if err.kind() == io::ErrorKind::PermissionDenied => libc::EPERM,
            FsError::Unreadable(_)
            | FsError::Io(_)
            | FsError::Store(_)
            | FsError::Tagging { .. } => libc::EIO,
        }
    }

    /// Open failures on a resolved path: a vanished file is `NotFound`.
    pub(crate) fn from_open(path: &std::path::Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            FsError::NotFound(path.display().to_string())
        } else {
            FsError::Io(err)
        }
    }
}

/// Top-level API errors (configuration, CLI, mounting)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Mount failed: {0}")]
    Mount(String),
}

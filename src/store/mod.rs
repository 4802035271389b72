//! Metadata Store
//!
//! Transactional bucket hierarchy (namespace → collection → entry) on top of
//! sled. All access goes through [`MetadataStore::with_read`] or
//! [`MetadataStore::with_write`]; a write closure that fails leaves no partial
//! writes behind.

pub mod layout;
pub(crate) mod persistence;

use crate::error::StoreError;
use crate::types::BucketPath;
use layout::StoredValue;
use persistence::SledSessions;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use std::path::{Path, PathBuf};
use tracing::debug;

const BUCKETS_TREE: &str = "buckets";

/// Record stored for a playlist or album entry: the real on-disk location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub path: String,
}

/// Playlist entries use the same record shape as album entries.
pub type PlaylistRecord = EntryRecord;

/// One direct entry of a bucket. `value` is `None` for sub-buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl BucketEntry {
    pub fn is_bucket(&self) -> bool {
        self.value.is_none()
    }
}

/// Point lookups shared by read and read-write transactions.
trait KeyLookup {
    fn fetch(&self, key: &[u8]) -> Result<Option<sled::IVec>, StoreError>;

    fn stored(&self, bucket: &BucketPath, key: &str) -> Result<Option<StoredValue>, StoreError> {
        match self.fetch(&layout::entry_key(bucket, key)?)? {
            Some(raw) => Ok(Some(layout::decode_value(&raw)?)),
            None => Ok(None),
        }
    }

    fn bucket_exists(&self, bucket: &BucketPath) -> Result<bool, StoreError> {
        match bucket.split_last() {
            None => Ok(true),
            Some((parent, name)) => Ok(matches!(
                self.stored(&parent, name)?,
                Some(StoredValue::Bucket)
            )),
        }
    }

    fn record(&self, bucket: &BucketPath, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if !self.bucket_exists(bucket)? {
            return Ok(None);
        }
        match self.stored(bucket, key)? {
            Some(StoredValue::Record(bytes)) => Ok(Some(bytes)),
            Some(StoredValue::Bucket) | None => Ok(None),
        }
    }
}

impl KeyLookup for sled::Tree {
    fn fetch(&self, key: &[u8]) -> Result<Option<sled::IVec>, StoreError> {
        Ok(self.get(key)?)
    }
}

impl KeyLookup for TransactionalTree {
    fn fetch(&self, key: &[u8]) -> Result<Option<sled::IVec>, StoreError> {
        Ok(self.get(key)?)
    }
}

/// Read transaction over the bucket hierarchy.
pub struct ReadTx<'a> {
    tree: &'a sled::Tree,
}

impl ReadTx<'_> {
    pub fn bucket_exists(&self, bucket: &BucketPath) -> Result<bool, StoreError> {
        self.tree.bucket_exists(bucket)
    }

    /// Record bytes at `key`; `None` when the bucket or key is absent or the
    /// key holds a sub-bucket.
    pub fn get(&self, bucket: &BucketPath, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.tree.record(bucket, key)
    }

    /// Direct entries of `bucket` in key order. Empty when the bucket is absent.
    pub fn iter(&self, bucket: &BucketPath) -> Result<Vec<BucketEntry>, StoreError> {
        if !self.tree.bucket_exists(bucket)? {
            return Ok(Vec::new());
        }
        let prefix = layout::entries_prefix(bucket)?;
        let mut entries = Vec::new();
        for item in self.tree.scan_prefix(&prefix) {
            let (key, raw) = item?;
            let name = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|e| StoreError::Corrupt(format!("non UTF-8 key in {}: {}", bucket, e)))?
                .to_string();
            let value = match layout::decode_value(&raw)? {
                StoredValue::Bucket => None,
                StoredValue::Record(bytes) => Some(bytes),
            };
            entries.push(BucketEntry { key: name, value });
        }
        Ok(entries)
    }
}

/// Read-write transaction. Closures may be re-run by sled on conflict.
pub struct WriteTx<'a> {
    tree: &'a TransactionalTree,
}

impl WriteTx<'_> {
    pub fn bucket_exists(&self, bucket: &BucketPath) -> Result<bool, StoreError> {
        self.tree.bucket_exists(bucket)
    }

    pub fn get(&self, bucket: &BucketPath, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.tree.record(bucket, key)
    }

    /// Create every missing bucket along `bucket`. Existing buckets are kept.
    pub fn ensure_bucket(&self, bucket: &BucketPath) -> Result<(), StoreError> {
        let mut current = BucketPath::root();
        for segment in bucket.segments() {
            match self.tree.stored(&current, segment)? {
                Some(StoredValue::Bucket) => {}
                Some(StoredValue::Record(_)) => {
                    return Err(StoreError::IncompatibleValue {
                        bucket: current.to_string(),
                        key: segment.clone(),
                    });
                }
                None => {
                    self.tree.insert(
                        layout::entry_key(&current, segment)?,
                        layout::encode_bucket_marker(),
                    )?;
                }
            }
            current = current.child(segment.as_str());
        }
        Ok(())
    }

    /// Store a record in an existing bucket.
    pub fn put(&self, bucket: &BucketPath, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if !self.tree.bucket_exists(bucket)? {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }
        if let Some(StoredValue::Bucket) = self.tree.stored(bucket, key)? {
            return Err(StoreError::IncompatibleValue {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        self.tree
            .insert(layout::entry_key(bucket, key)?, layout::encode_record(value))?;
        Ok(())
    }
}

/// Handle on the store location. Holds no open database between calls.
pub struct MetadataStore {
    sessions: SledSessions,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            sessions: SledSessions::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        self.sessions.path()
    }

    /// Run `f` in a read transaction.
    ///
    /// Reads go straight to the live tree and are not a snapshot: a write
    /// committed while `f` runs may be partly visible. The FUSE session
    /// dispatches requests one at a time, so no mount-side write overlaps a
    /// read.
    pub fn with_read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let session = self.sessions.open()?;
        let tree = session.open_tree(BUCKETS_TREE).map_err(StoreError::from)?;
        f(&ReadTx { tree: &tree })
    }

    /// Run `f` in a serializable read-write transaction and make it durable.
    pub fn with_write<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(&WriteTx<'_>) -> Result<T, StoreError>,
    {
        let session = self.sessions.open()?;
        let tree = session.open_tree(BUCKETS_TREE)?;
        let outcome = tree.transaction(|tx| {
            f(&WriteTx { tree: tx }).map_err(|err| match err {
                StoreError::Interrupted(inner) => ConflictableTransactionError::from(inner),
                other => ConflictableTransactionError::Abort(other),
            })
        });
        let value = match outcome {
            Ok(value) => value,
            Err(TransactionError::Abort(err)) => {
                debug!(error = %err, "store transaction aborted");
                return Err(err);
            }
            Err(TransactionError::Storage(err)) => return Err(StoreError::Sled(err)),
        };
        session.flush()?;
        Ok(value)
    }

    /// Fetch and decode a JSON record.
    pub fn get_record(
        &self,
        bucket: &BucketPath,
        key: &str,
    ) -> Result<Option<EntryRecord>, StoreError> {
        self.with_read(|tx| match tx.get(bucket, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        })
    }

    /// Ensure `bucket` and store `record` at `key` in one transaction.
    pub fn put_record(
        &self,
        bucket: &BucketPath,
        key: &str,
        record: &EntryRecord,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        self.with_write(|tx| {
            tx.ensure_bucket(bucket)?;
            tx.put(bucket, key, &bytes)
        })
    }
}

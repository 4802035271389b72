//! Per-call store sessions
//!
//! The sled database is opened at the start of a store call and closed when
//! the call ends. sled holds an exclusive lock on its directory, so calls that
//! overlap in time share one open database; it is dropped as soon as the last
//! of them finishes. The slot mutex is held while the last reference drops so
//! a new opener never races a closing database for the lock.

use crate::error::StoreError;
use parking_lot::Mutex;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::trace;

pub(crate) struct SledSessions {
    path: PathBuf,
    slot: Mutex<Weak<sled::Db>>,
}

impl SledSessions {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            slot: Mutex::new(Weak::new()),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn open(&self) -> Result<Session<'_>, StoreError> {
        let mut slot = self.slot.lock();
        if let Some(db) = slot.upgrade() {
            return Ok(Session {
                db: Some(db),
                slot: &self.slot,
            });
        }

        trace!(path = %self.path.display(), "opening metadata store");
        let db = sled::Config::new()
            .path(&self.path)
            .flush_every_ms(None)
            .open()
            .map_err(|source| StoreError::Open {
                path: self.path.clone(),
                source,
            })?;
        let db = Arc::new(db);
        *slot = Arc::downgrade(&db);
        Ok(Session {
            db: Some(db),
            slot: &self.slot,
        })
    }
}

/// An open database for the duration of one store call.
pub(crate) struct Session<'a> {
    db: Option<Arc<sled::Db>>,
    slot: &'a Mutex<Weak<sled::Db>>,
}

impl Deref for Session<'_> {
    type Target = sled::Db;

    fn deref(&self) -> &sled::Db {
        // Only `Drop` takes the database out.
        self.db.as_deref().unwrap_or_else(|| unreachable!("session used after close"))
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let _slot = self.slot.lock();
        if let Some(db) = self.db.take() {
            if Arc::strong_count(&db) == 1 {
                trace!("closing metadata store");
            }
            drop(db);
        }
    }
}

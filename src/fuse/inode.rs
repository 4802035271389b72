//! Inode and file-handle bookkeeping for the FUSE session.

use super::path::VirtualPath;
use crate::node::Handle;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const ROOT_INODE: u64 = fuser::FUSE_ROOT_ID;

/// Stable inode numbers per virtual path for the lifetime of the mount.
pub struct InodeTable {
    next_inode: AtomicU64,
    by_inode: RwLock<HashMap<u64, VirtualPath>>,
    by_path: RwLock<HashMap<VirtualPath, u64>>,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut by_inode = HashMap::new();
        let mut by_path = HashMap::new();
        by_inode.insert(ROOT_INODE, VirtualPath::Root);
        by_path.insert(VirtualPath::Root, ROOT_INODE);
        Self {
            next_inode: AtomicU64::new(ROOT_INODE + 1),
            by_inode: RwLock::new(by_inode),
            by_path: RwLock::new(by_path),
        }
    }

    pub fn path(&self, inode: u64) -> Option<VirtualPath> {
        self.by_inode.read().get(&inode).cloned()
    }

    pub fn get_or_create(&self, path: &VirtualPath) -> u64 {
        if let Some(inode) = self.by_path.read().get(path) {
            return *inode;
        }
        let mut by_path = self.by_path.write();
        if let Some(inode) = by_path.get(path) {
            return *inode;
        }
        let inode = self.next_inode.fetch_add(1, Ordering::SeqCst);
        by_path.insert(path.clone(), inode);
        self.by_inode.write().insert(inode, path.clone());
        inode
    }

    pub fn len(&self) -> usize {
        self.by_inode.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_inode.read().is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Open handles by kernel file-handle number.
pub struct HandleTable {
    next_fh: AtomicU64,
    handles: Mutex<HashMap<u64, Arc<Handle>>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_fh: AtomicU64::new(1),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, handle: Handle) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.handles.lock().insert(fh, Arc::new(handle));
        fh
    }

    /// Shared reference so I/O runs without holding the table lock.
    pub fn get(&self, fh: u64) -> Option<Arc<Handle>> {
        self.handles.lock().get(&fh).cloned()
    }

    pub fn remove(&self, fh: u64) -> Option<Arc<Handle>> {
        self.handles.lock().remove(&fh)
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

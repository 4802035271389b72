//! Namespace listing: store entries merged with on-disk entries.

use crate::error::{FsError, StoreError};
use crate::store::MetadataStore;
use crate::types::{BucketPath, Container, DirEntry};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

#[derive(Clone)]
pub struct NamespaceListing {
    store: Arc<MetadataStore>,
    root: PathBuf,
}

impl NamespaceListing {
    pub fn new(store: Arc<MetadataStore>, root: PathBuf) -> Self {
        Self { store, root }
    }

    /// One directory entry per sub-bucket of `parent`, in key order.
    pub fn list_containers(&self, parent: &BucketPath) -> Result<Vec<DirEntry>, FsError> {
        let entries = self
            .store
            .with_read::<_, StoreError, _>(|tx| tx.iter(parent))?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.is_bucket())
            .map(|entry| DirEntry::directory(entry.key))
            .collect())
    }

    pub fn list_playlists(&self) -> Result<Vec<DirEntry>, FsError> {
        self.list_containers(&BucketPath::playlists())
    }

    /// Recorded entries (key order) followed by files found in the fallback
    /// directory (directory order). A file present in both shows up twice.
    pub fn list_entries(&self, container: &Container) -> Result<Vec<DirEntry>, FsError> {
        let bucket = container.bucket();
        let mut listed: Vec<DirEntry> = self
            .store
            .with_read::<_, StoreError, _>(|tx| tx.iter(&bucket))?
            .into_iter()
            .filter(|entry| !entry.is_bucket())
            .map(|entry| DirEntry::file(entry.key))
            .collect();

        let dir = container.fallback_dir(&self.root);
        listed.extend(scan_files(&dir));
        trace!(%container, count = listed.len(), "listed entries");
        Ok(listed)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Non-directory files directly inside `dir`; unreadable directories yield nothing.
fn scan_files(dir: &Path) -> Vec<DirEntry> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    read_dir
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_type()
                .map(|file_type| !file_type.is_dir())
                .unwrap_or(false)
        })
        .filter_map(|entry| entry.file_name().into_string().ok())
        .map(DirEntry::file)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntryRecord;

    fn fixture() -> (tempfile::TempDir, PathBuf, Arc<MetadataStore>, NamespaceListing) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let store = Arc::new(MetadataStore::new(dir.path().join("store")));
        let listing = NamespaceListing::new(store.clone(), root.clone());
        (dir, root, store, listing)
    }

    fn record(path: &str) -> EntryRecord {
        EntryRecord {
            path: path.to_string(),
        }
    }

    #[test]
    fn test_list_playlists_ignores_leaf_keys() {
        let (_dir, _root, store, listing) = fixture();
        store
            .with_write(|tx| {
                tx.ensure_bucket(&BucketPath::playlists().child("b"))?;
                tx.ensure_bucket(&BucketPath::playlists().child("a"))?;
                tx.put(&BucketPath::playlists(), "stray", b"{}")
            })
            .unwrap();

        let names: Vec<_> = listing
            .list_playlists()
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_list_playlists_empty_store() {
        let (_dir, _root, _store, listing) = fixture();
        assert!(listing.list_playlists().unwrap().is_empty());
    }

    #[test]
    fn test_entries_merge_store_then_disk_without_dedup() {
        let (_dir, root, store, listing) = fixture();
        let mix = Container::Playlist("mix".into());
        store
            .put_record(&mix.bucket(), "track2", &record("/m/2.mp3"))
            .unwrap();
        store
            .put_record(&mix.bucket(), "track1", &record("/m/1.mp3"))
            .unwrap();
        let disk = root.join("playlists").join("mix");
        fs::create_dir_all(disk.join("subdir")).unwrap();
        fs::write(disk.join("track1"), b"dup").unwrap();

        let entries = listing.list_entries(&mix).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["track1", "track2", "track1"]);
        assert!(entries.iter().all(|e| e.kind == crate::types::EntryKind::File));
    }

    #[test]
    fn test_entries_from_disk_only() {
        let (_dir, root, _store, listing) = fixture();
        let drop_dir = root.join("drop");
        fs::create_dir_all(&drop_dir).unwrap();
        fs::write(drop_dir.join("new.mp3"), b"x").unwrap();

        let entries = listing.list_entries(&Container::Drop).unwrap();
        assert_eq!(entries, vec![DirEntry::file("new.mp3")]);
    }

    #[test]
    fn test_entries_missing_everywhere_is_empty() {
        let (_dir, _root, _store, listing) = fixture();
        let entries = listing
            .list_entries(&Container::Playlist("ghost".into()))
            .unwrap();
        assert!(entries.is_empty());
    }
}

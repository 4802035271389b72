//! Path resolution across the two backing tiers.
//!
//! An entry is either registered in the metadata store (with a real path that
//! may live anywhere) or simply present in its container's fallback directory.

use crate::error::{FsError, StoreError};
use crate::store::{EntryRecord, MetadataStore};
use crate::types::Container;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Clone)]
pub struct PathResolver {
    store: Arc<MetadataStore>,
    root: PathBuf,
}

impl PathResolver {
    pub fn new(store: Arc<MetadataStore>, root: PathBuf) -> Self {
        Self { store, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Real on-disk location of `entry` in `container`.
    pub fn resolve(&self, container: &Container, entry: &str) -> Result<PathBuf, FsError> {
        if let Some(path) = self.recorded_path(container, entry)? {
            trace!(%container, entry, path = %path.display(), "resolved from store");
            return Ok(path);
        }

        let fallback = self.fallback_path(container, entry);
        match std::fs::metadata(&fallback) {
            Ok(meta) if !meta.is_dir() => {
                trace!(%container, entry, path = %fallback.display(), "resolved from fallback");
                Ok(fallback)
            }
            Ok(_) => {
                debug!(path = %fallback.display(), "fallback path is a directory");
                Err(FsError::NotFound(format!("{} in {}", entry, container)))
            }
            Err(_) => Err(FsError::NotFound(format!("{} in {}", entry, container))),
        }
    }

    /// Path stored in the metadata store, if the entry is registered.
    pub fn recorded_path(
        &self,
        container: &Container,
        entry: &str,
    ) -> Result<Option<PathBuf>, FsError> {
        let bucket = container.bucket();
        let raw = match self
            .store
            .with_read::<_, StoreError, _>(|tx| tx.get(&bucket, entry))
        {
            Ok(raw) => raw,
            // Names the store cannot hold are never registered.
            Err(StoreError::InvalidName(_)) => None,
            Err(err) => return Err(err.into()),
        };
        let Some(raw) = raw else {
            return Ok(None);
        };
        let record: EntryRecord = serde_json::from_slice(&raw).map_err(|e| {
            FsError::Unreadable(format!("{} in {}: {}", entry, container, e))
        })?;
        Ok(Some(PathBuf::from(record.path)))
    }

    /// Conventional location used when no record exists.
    pub fn fallback_path(&self, container: &Container, entry: &str) -> PathBuf {
        container.fallback_dir(&self.root).join(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BucketPath;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        store: Arc<MetadataStore>,
        resolver: PathResolver,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let store = Arc::new(MetadataStore::new(dir.path().join("store")));
        let resolver = PathResolver::new(store.clone(), root.clone());
        Fixture {
            _dir: dir,
            root,
            store,
            resolver,
        }
    }

    fn playlist_dir(fx: &Fixture, name: &str) -> PathBuf {
        let dir = fx.root.join("playlists").join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_record_wins_over_fallback_file() {
        let fx = fixture();
        let dir = playlist_dir(&fx, "mix");
        fs::write(dir.join("track1"), b"local").unwrap();
        fx.store
            .put_record(
                &BucketPath::playlists().child("mix"),
                "track1",
                &EntryRecord {
                    path: "/music/a.mp3".to_string(),
                },
            )
            .unwrap();

        let resolved = fx
            .resolver
            .resolve(&Container::Playlist("mix".into()), "track1")
            .unwrap();
        assert_eq!(resolved, PathBuf::from("/music/a.mp3"));
    }

    #[test]
    fn test_fallback_file_without_record() {
        let fx = fixture();
        let dir = playlist_dir(&fx, "mix");
        fs::write(dir.join("dropped.mp3"), b"x").unwrap();

        let resolved = fx
            .resolver
            .resolve(&Container::Playlist("mix".into()), "dropped.mp3")
            .unwrap();
        assert_eq!(resolved, dir.join("dropped.mp3"));
    }

    #[test]
    fn test_missing_everywhere_is_not_found() {
        let fx = fixture();
        let err = fx
            .resolver
            .resolve(&Container::Playlist("mix".into()), "ghost.mp3")
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[test]
    fn test_fallback_directory_is_not_found() {
        let fx = fixture();
        let dir = playlist_dir(&fx, "mix");
        fs::create_dir_all(dir.join("nested")).unwrap();
        let err = fx
            .resolver
            .resolve(&Container::Playlist("mix".into()), "nested")
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[test]
    fn test_undecodable_record_is_unreadable() {
        let fx = fixture();
        let mix = BucketPath::playlists().child("mix");
        fx.store
            .with_write(|tx| {
                tx.ensure_bucket(&mix)?;
                tx.put(&mix, "broken", b"not json")
            })
            .unwrap();
        let err = fx
            .resolver
            .resolve(&Container::Playlist("mix".into()), "broken")
            .unwrap_err();
        assert!(matches!(err, FsError::Unreadable(_)));
    }

    #[test]
    fn test_album_fallback_layout() {
        let fx = fixture();
        let album = Container::album("Queen", "Jazz");
        assert_eq!(
            fx.resolver.fallback_path(&album, "Mustapha.mp3"),
            fx.root.join("Queen").join("Jazz").join("Mustapha.mp3")
        );
    }
}

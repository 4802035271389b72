//! Playlists
//!
//! Creation and membership writes against the metadata store, followed by
//! regeneration of the serialized playlist file.

pub mod m3u;

use crate::error::{FsError, StoreError};
use crate::namespace::compatible_name;
use crate::store::{EntryRecord, MetadataStore};
use crate::types::BucketPath;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub use m3u::M3uRegenerator;

/// Rewrites the serialized file of a playlist after its contents change.
pub trait PlaylistRegenerator: Send + Sync {
    fn regenerate(&self, playlist: &str) -> Result<(), FsError>;
}

pub struct PlaylistManager {
    store: Arc<MetadataStore>,
    regenerator: Arc<dyn PlaylistRegenerator>,
}

impl PlaylistManager {
    pub fn new(store: Arc<MetadataStore>, regenerator: Arc<dyn PlaylistRegenerator>) -> Self {
        Self { store, regenerator }
    }

    /// Create (or keep) the playlist and return its normalized name.
    ///
    /// Store failures abort before regeneration; regeneration failures are
    /// logged only.
    pub fn create_playlist(&self, name: &str) -> Result<String, StoreError> {
        let name = compatible_name(name);
        let bucket = BucketPath::playlists().child(name.as_str());
        self.store.with_write(|tx| tx.ensure_bucket(&bucket))?;
        info!(playlist = %name, "playlist created");
        self.regenerate(&name);
        Ok(name)
    }

    /// Register `song` in `playlist`, pointing at `path`.
    pub fn add_to_playlist(
        &self,
        playlist: &str,
        song: &str,
        path: &Path,
    ) -> Result<(), StoreError> {
        let bucket = BucketPath::playlists().child(playlist);
        let record = EntryRecord {
            path: path.to_string_lossy().into_owned(),
        };
        self.store.put_record(&bucket, song, &record)?;
        info!(playlist, song, path = %path.display(), "song added to playlist");
        self.regenerate(playlist);
        Ok(())
    }

    fn regenerate(&self, playlist: &str) {
        if let Err(err) = self.regenerator.regenerate(playlist) {
            warn!(playlist, error = %err, "playlist file regeneration failed");
        }
    }
}

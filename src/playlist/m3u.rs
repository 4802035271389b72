//! Playlist file regeneration (extended M3U).

use super::PlaylistRegenerator;
use crate::error::FsError;
use crate::namespace::{NamespaceListing, PathResolver};
use crate::types::{Container, PLAYLISTS_DIR};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Writes `<root>/playlists/<name>.m3u` listing the resolved path of every entry.
pub struct M3uRegenerator {
    listing: NamespaceListing,
    resolver: PathResolver,
}

impl M3uRegenerator {
    pub fn new(listing: NamespaceListing, resolver: PathResolver) -> Self {
        Self { listing, resolver }
    }

    pub fn playlist_file(&self, playlist: &str) -> PathBuf {
        self.resolver
            .root()
            .join(PLAYLISTS_DIR)
            .join(format!("{}.m3u", playlist))
    }

    fn render(&self, playlist: &str) -> Result<String, FsError> {
        let container = Container::Playlist(playlist.to_string());
        let mut seen = HashSet::new();
        let mut body = String::from("#EXTM3U\n");
        for entry in self.listing.list_entries(&container)? {
            if !seen.insert(entry.name.clone()) {
                continue;
            }
            match self.resolver.resolve(&container, &entry.name) {
                Ok(path) => {
                    body.push_str(&format!("#EXTINF:-1,{}\n", entry.name));
                    body.push_str(&path.to_string_lossy());
                    body.push('\n');
                }
                Err(err) => warn!(playlist, entry = %entry.name, error = %err, "skipping unresolvable entry"),
            }
        }
        Ok(body)
    }
}

impl PlaylistRegenerator for M3uRegenerator {
    fn regenerate(&self, playlist: &str) -> Result<(), FsError> {
        let body = self.render(playlist)?;
        let target = self.playlist_file(playlist);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let staging = target.with_extension("m3u.tmp");
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&staging, &target)?;
        debug!(playlist, path = %target.display(), "playlist file regenerated");
        Ok(())
    }
}

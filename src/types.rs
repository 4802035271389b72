//! Core types for the music library filesystem.

use std::fmt;
use std::path::{Path, PathBuf};

/// Top-level bucket holding one sub-bucket per playlist.
pub const PLAYLISTS_BUCKET: &str = "Playlists";
/// Top-level bucket holding `<artist>/<album>` sub-buckets.
pub const ARTISTS_BUCKET: &str = "Artists";
/// Bucket for special files stored from the drop area.
pub const DROP_BUCKET: &str = "Drop";

/// Directory names under the backing root.
pub const PLAYLISTS_DIR: &str = "playlists";
pub const DROP_DIR: &str = "drop";

/// Synthetic per-directory description file.
pub const DESCRIPTION_NAME: &str = ".description";

/// Path of a bucket in the metadata store hierarchy.
///
/// The empty path is the root bucket; every other bucket is registered as a
/// sub-bucket entry in its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BucketPath(Vec<String>);

impl BucketPath {
    pub fn root() -> Self {
        BucketPath(Vec::new())
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        BucketPath(segments)
    }

    pub fn playlists() -> Self {
        Self::root().child(PLAYLISTS_BUCKET)
    }

    pub fn artists() -> Self {
        Self::root().child(ARTISTS_BUCKET)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into parent bucket and own name; `None` for the root.
    pub fn split_last(&self) -> Option<(BucketPath, &str)> {
        let (last, parent) = self.0.split_last()?;
        Some((BucketPath(parent.to_vec()), last.as_str()))
    }
}

impl fmt::Display for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        write!(f, "{}", self.0.join("/"))
    }
}

/// A directory grouping entries in the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Container {
    Playlist(String),
    Artist(String),
    Album { artist: String, album: String },
    Drop,
}

impl Container {
    pub fn album(artist: impl Into<String>, album: impl Into<String>) -> Self {
        Container::Album {
            artist: artist.into(),
            album: album.into(),
        }
    }

    /// Bucket recording this container's entries.
    pub fn bucket(&self) -> BucketPath {
        match self {
            Container::Playlist(name) => BucketPath::playlists().child(name.as_str()),
            Container::Artist(artist) => BucketPath::artists().child(artist.as_str()),
            Container::Album { artist, album } => BucketPath::artists()
                .child(artist.as_str())
                .child(album.as_str()),
            Container::Drop => BucketPath::root().child(DROP_BUCKET),
        }
    }

    /// Conventional on-disk directory for entries not recorded in the store.
    pub fn fallback_dir(&self, root: &Path) -> PathBuf {
        match self {
            Container::Playlist(name) => root.join(PLAYLISTS_DIR).join(name),
            Container::Artist(artist) => root.join(artist),
            Container::Album { artist, album } => root.join(artist).join(album),
            Container::Drop => root.join(DROP_DIR),
        }
    }

    /// Artist and album, when the container carries library context.
    pub fn album_context(&self) -> Option<(&str, &str)> {
        match self {
            Container::Album { artist, album } => Some((artist.as_str(), album.as_str())),
            _ => None,
        }
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, Container::Drop)
    }

    /// Display name used in descriptions and logs.
    pub fn name(&self) -> &str {
        match self {
            Container::Playlist(name) | Container::Artist(name) => name,
            Container::Album { album, .. } => album,
            Container::Drop => DROP_DIR,
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Playlist(name) => write!(f, "playlist {}", name),
            Container::Artist(artist) => write!(f, "artist {}", artist),
            Container::Album { artist, album } => write!(f, "album {}/{}", artist, album),
            Container::Drop => write!(f, "drop area"),
        }
    }
}

/// Kind of a namespace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One entry produced by namespace listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn directory(name: impl Into<String>) -> Self {
        DirEntry {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        DirEntry {
            name: name.into(),
            kind: EntryKind::File,
        }
    }
}

//! Mapping between mount-relative paths and namespace locations.
//!
//! ```text
//! /                               root
//! /playlists                      one directory per playlist
//! /playlists/<playlist>/<entry>
//! /drop/<entry>                   files written here are ingested on close
//! /<artist>/<album>/<entry>
//! /<artist>/.<dotfile>            artist-level description and sidecars
//! ```

use crate::types::{Container, DROP_DIR, PLAYLISTS_DIR};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VirtualPath {
    Root,
    PlaylistsDir,
    DropDir,
    Dir(Container),
    Entry { container: Container, name: String },
}

impl VirtualPath {
    /// Parse mount-relative segments. `None` for paths outside the namespace.
    pub fn parse<S: AsRef<str>>(segments: &[S]) -> Option<Self> {
        let parts: Vec<&str> = segments.iter().map(|s| s.as_ref()).collect();
        if parts.iter().any(|p| p.is_empty() || *p == "." || *p == "..") {
            return None;
        }
        let path = match parts.as_slice() {
            [] => VirtualPath::Root,
            [PLAYLISTS_DIR] => VirtualPath::PlaylistsDir,
            [DROP_DIR] => VirtualPath::DropDir,
            [PLAYLISTS_DIR, playlist] if !playlist.starts_with('.') => {
                VirtualPath::Dir(Container::Playlist(playlist.to_string()))
            }
            [PLAYLISTS_DIR, playlist, name] if !playlist.starts_with('.') => VirtualPath::Entry {
                container: Container::Playlist(playlist.to_string()),
                name: name.to_string(),
            },
            [DROP_DIR, name] => VirtualPath::Entry {
                container: Container::Drop,
                name: name.to_string(),
            },
            [PLAYLISTS_DIR, ..] | [DROP_DIR, ..] => return None,
            [artist, ..] if artist.starts_with('.') => return None,
            [artist] => VirtualPath::Dir(Container::Artist(artist.to_string())),
            [artist, name] if name.starts_with('.') => VirtualPath::Entry {
                container: Container::Artist(artist.to_string()),
                name: name.to_string(),
            },
            [artist, album] => VirtualPath::Dir(Container::album(*artist, *album)),
            [artist, album, name] if !album.starts_with('.') => {
                VirtualPath::Entry {
                    container: Container::album(*artist, *album),
                    name: name.to_string(),
                }
            }
            _ => return None,
        };
        Some(path)
    }

    pub fn segments(&self) -> Vec<String> {
        match self {
            VirtualPath::Root => Vec::new(),
            VirtualPath::PlaylistsDir => vec![PLAYLISTS_DIR.to_string()],
            VirtualPath::DropDir => vec![DROP_DIR.to_string()],
            VirtualPath::Dir(container) => container_segments(container),
            VirtualPath::Entry { container, name } => {
                let mut segments = container_segments(container);
                segments.push(name.clone());
                segments
            }
        }
    }

    /// Path of `name` inside this directory.
    pub fn child(&self, name: &str) -> Option<Self> {
        let mut segments = self.segments();
        segments.push(name.to_string());
        Self::parse(&segments)
    }

    pub fn is_dir(&self) -> bool {
        !matches!(self, VirtualPath::Entry { .. })
    }

    /// Container whose entries this directory lists.
    pub fn container(&self) -> Option<Container> {
        match self {
            VirtualPath::DropDir => Some(Container::Drop),
            VirtualPath::Dir(container) => Some(container.clone()),
            _ => None,
        }
    }
}

fn container_segments(container: &Container) -> Vec<String> {
    match container {
        Container::Playlist(name) => vec![PLAYLISTS_DIR.to_string(), name.clone()],
        Container::Artist(artist) => vec![artist.clone()],
        Container::Album { artist, album } => vec![artist.clone(), album.clone()],
        Container::Drop => vec![DROP_DIR.to_string()],
    }
}

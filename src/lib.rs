//! mulifs: Music Library Filesystem
//!
//! Presents a directory of audio files as a mountable filesystem of
//! playlists and artist/album directories, backed by an embedded metadata
//! store. Files dropped into the mount are moved, registered and re-tagged.

pub mod config;
pub mod error;
pub mod fuse;
pub mod ingest;
pub mod library;
pub mod logging;
pub mod namespace;
pub mod node;
pub mod playlist;
pub mod store;
pub mod tooling;
pub mod types;

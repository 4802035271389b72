//! Integration tests for the mulifs library filesystem

mod cli_parse;
mod drop_ingest;
mod playlist_scenarios;
mod special_files;

use mulifs::library::Library;
use std::sync::Arc;
use tempfile::TempDir;

/// Fresh library with its backing layout in place.
pub fn library() -> (TempDir, Arc<Library>) {
    let dir = TempDir::new().unwrap();
    let library = Library::builder(dir.path().join("store"), dir.path().join("root")).build();
    library.ensure_layout().unwrap();
    (dir, library)
}

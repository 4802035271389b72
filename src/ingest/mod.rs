//! Drop Ingestion
//!
//! Files released in the drop area are moved to their permanent location
//! `<root>/<artist>/<album>/<title>.<ext>`, registered under
//! `Artists/<artist>/<album>` and re-tagged.

pub mod tags;

use crate::error::FsError;
use crate::namespace::{compatible_file_name, compatible_name};
use crate::store::{EntryRecord, MetadataStore};
use crate::types::Container;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub use tags::{is_recognized_audio, Id3TagRewriter, TagRewriter, TrackTags};

/// Takes ownership of a file that was just dropped and closed.
pub trait DropHandler: Send + Sync {
    fn ingest(&self, dropped: &Path) -> Result<(), FsError>;
}

/// Where an ingested file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub container: Container,
    pub entry: String,
    pub path: PathBuf,
}

pub struct LibraryIngestor {
    store: Arc<MetadataStore>,
    root: PathBuf,
    tags: Arc<dyn TagRewriter>,
}

impl LibraryIngestor {
    pub fn new(store: Arc<MetadataStore>, root: PathBuf, tags: Arc<dyn TagRewriter>) -> Self {
        Self { store, root, tags }
    }

    /// Move, register and re-tag one file.
    pub fn ingest_file(&self, dropped: &Path) -> Result<IngestOutcome, FsError> {
        let meta = fs::metadata(dropped)
            .map_err(|_| FsError::NotFound(dropped.display().to_string()))?;
        if meta.is_dir() {
            return Err(FsError::NotFound(dropped.display().to_string()));
        }

        let track = TrackTags::read(dropped);
        let artist = compatible_name(&track.artist);
        let album = compatible_name(&track.album);
        let container = Container::album(artist, album);

        let extension = dropped.extension().and_then(|e| e.to_str());
        let preferred = compatible_file_name(&track.title, extension);
        let dest_dir = container.fallback_dir(&self.root);
        fs::create_dir_all(&dest_dir)?;
        let (entry, dest) = unique_destination(&dest_dir, &preferred);

        move_file(dropped, &dest)?;
        debug!(from = %dropped.display(), to = %dest.display(), "moved dropped file");

        let record = EntryRecord {
            path: dest.to_string_lossy().into_owned(),
        };
        self.store.put_record(&container.bucket(), &entry, &record)?;

        if is_recognized_audio(&entry) {
            self.tags
                .rewrite_tags(&track.artist, &track.album, &track.title, &dest)?;
        }

        info!(%container, entry = %entry, path = %dest.display(), "ingested dropped file");
        Ok(IngestOutcome {
            container,
            entry,
            path: dest,
        })
    }
}

impl DropHandler for LibraryIngestor {
    fn ingest(&self, dropped: &Path) -> Result<(), FsError> {
        self.ingest_file(dropped).map(|_| ())
    }
}

/// First free name of the form `name`, `stem_2.ext`, `stem_3.ext`, ...
fn unique_destination(dir: &Path, preferred: &str) -> (String, PathBuf) {
    let candidate = dir.join(preferred);
    if !candidate.exists() {
        return (preferred.to_string(), candidate);
    }
    let path = Path::new(preferred);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| preferred.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let mut n = 2u32;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        };
        let candidate = dir.join(&name);
        if !candidate.exists() {
            return (name, candidate);
        }
        n += 1;
    }
}

/// Rename, falling back to copy + remove across devices.
fn move_file(from: &Path, to: &Path) -> Result<(), FsError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.raw_os_error() == Some(libc::EXDEV) => {
            fs::copy(from, to)?;
            fs::remove_file(from)?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

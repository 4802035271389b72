//! Library: the shared state behind every node
//!
//! Bundles the metadata store, the backing root directory and the pluggable
//! collaborators (tag rewriting, drop ingestion, playlist regeneration).

use crate::error::{FsError, StoreError};
use crate::ingest::{DropHandler, Id3TagRewriter, LibraryIngestor, TagRewriter};
use crate::namespace::{NamespaceListing, PathResolver};
use crate::node::special::SpecialFileRegistry;
use crate::node::Node;
use crate::playlist::{M3uRegenerator, PlaylistManager, PlaylistRegenerator};
use crate::store::MetadataStore;
use crate::types::{Container, DESCRIPTION_NAME, DROP_DIR, PLAYLISTS_DIR};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct Library {
    store: Arc<MetadataStore>,
    root: PathBuf,
    resolver: PathResolver,
    listing: NamespaceListing,
    playlists: PlaylistManager,
    tags: Arc<dyn TagRewriter>,
    drop_handler: Arc<dyn DropHandler>,
    specials: SpecialFileRegistry,
}

/// Builds a [`Library`], defaulting every collaborator that is not supplied.
pub struct LibraryBuilder {
    store_path: PathBuf,
    root: PathBuf,
    tags: Option<Arc<dyn TagRewriter>>,
    drop_handler: Option<Arc<dyn DropHandler>>,
    regenerator: Option<Arc<dyn PlaylistRegenerator>>,
}

impl LibraryBuilder {
    pub fn tag_rewriter(mut self, tags: Arc<dyn TagRewriter>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn drop_handler(mut self, handler: Arc<dyn DropHandler>) -> Self {
        self.drop_handler = Some(handler);
        self
    }

    pub fn regenerator(mut self, regenerator: Arc<dyn PlaylistRegenerator>) -> Self {
        self.regenerator = Some(regenerator);
        self
    }

    pub fn build(self) -> Arc<Library> {
        let root = dunce::simplified(&self.root).to_path_buf();
        let store = Arc::new(MetadataStore::new(self.store_path));
        let resolver = PathResolver::new(store.clone(), root.clone());
        let listing = NamespaceListing::new(store.clone(), root.clone());

        let tags = self
            .tags
            .unwrap_or_else(|| Arc::new(Id3TagRewriter) as Arc<dyn TagRewriter>);
        let drop_handler = self.drop_handler.unwrap_or_else(|| {
            Arc::new(LibraryIngestor::new(store.clone(), root.clone(), tags.clone()))
        });
        let regenerator = self.regenerator.unwrap_or_else(|| {
            Arc::new(M3uRegenerator::new(listing.clone(), resolver.clone()))
        });
        let playlists = PlaylistManager::new(store.clone(), regenerator);

        Arc::new(Library {
            store,
            root,
            resolver,
            listing,
            playlists,
            tags,
            drop_handler,
            specials: SpecialFileRegistry::new(),
        })
    }
}

/// Generated `.description` content when none has been stored.
#[derive(Debug, Serialize)]
struct ContainerDescription<'a> {
    kind: &'static str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    artist: Option<&'a str>,
    directory: String,
}

impl Library {
    pub fn builder(store_path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> LibraryBuilder {
        LibraryBuilder {
            store_path: store_path.into(),
            root: root.into(),
            tags: None,
            drop_handler: None,
            regenerator: None,
        }
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// Backing root directory (not the mountpoint).
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn listing(&self) -> &NamespaceListing {
        &self.listing
    }

    pub fn playlists(&self) -> &PlaylistManager {
        &self.playlists
    }

    pub fn tag_rewriter(&self) -> &Arc<dyn TagRewriter> {
        &self.tags
    }

    pub fn drop_handler(&self) -> &Arc<dyn DropHandler> {
        &self.drop_handler
    }

    pub(crate) fn specials(&self) -> &SpecialFileRegistry {
        &self.specials
    }

    /// Node for `name` inside `container`.
    pub fn node(self: &Arc<Self>, container: Container, name: impl Into<String>) -> Arc<Node> {
        Arc::new(Node::new(self.clone(), container, name.into()))
    }

    /// Create the backing directories the namespace expects.
    pub fn ensure_layout(&self) -> io::Result<()> {
        for dir in [
            self.root.clone(),
            self.root.join(PLAYLISTS_DIR),
            self.root.join(DROP_DIR),
        ] {
            fs::create_dir_all(&dir)?;
        }
        debug!(root = %self.root.display(), "backing layout ready");
        Ok(())
    }

    /// Whether `container` exists in the namespace. The drop area always does.
    pub fn container_exists(&self, container: &Container) -> Result<bool, FsError> {
        if container.is_drop() {
            return Ok(true);
        }
        let bucket = container.bucket();
        match self
            .store
            .with_read::<_, StoreError, _>(|tx| tx.bucket_exists(&bucket))
        {
            Ok(exists) => Ok(exists),
            Err(StoreError::InvalidName(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Bytes served for `<container>/.description`.
    ///
    /// A stored `.description` record wins; otherwise a JSON summary of the
    /// container is generated.
    pub fn describe(&self, container: &Container) -> Result<Vec<u8>, FsError> {
        if !self.container_exists(container)? {
            return Err(FsError::NotFound(format!("{}", container)));
        }
        let bucket = container.bucket();
        let stored = self
            .store
            .with_read::<_, StoreError, _>(|tx| tx.get(&bucket, DESCRIPTION_NAME))?;
        if let Some(bytes) = stored {
            return Ok(bytes);
        }

        let (kind, artist) = match container {
            Container::Playlist(_) => ("playlist", None),
            Container::Artist(_) => ("artist", None),
            Container::Album { artist, .. } => ("album", Some(artist.as_str())),
            Container::Drop => ("drop", None),
        };
        let description = ContainerDescription {
            kind,
            name: container.name(),
            artist,
            directory: container
                .fallback_dir(&self.root)
                .to_string_lossy()
                .into_owned(),
        };
        let mut bytes = serde_json::to_vec_pretty(&description).map_err(StoreError::from)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

//! Nodes and handles
//!
//! A [`Node`] is one file entry inside a container. Its behavior depends on
//! the entry name: the synthetic `.description`, operating-system sidecar
//! files kept in memory, other dotfiles (always refused) and real content
//! backed by a file on disk.

pub mod handle;
pub mod special;

use crate::error::FsError;
use crate::library::Library;
use crate::types::{Container, EntryKind, DESCRIPTION_NAME};
use special::SpecialFileBuffer;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

pub use handle::Handle;

const SYNTHETIC_PERM: u16 = 0o444;
const SPECIAL_PERM: u16 = 0o644;

/// Behavior class of a node, decided by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Description,
    /// `.DS_Store` and AppleDouble `._*` files.
    Special,
    /// Any other dotfile.
    Hidden,
    Content,
}

impl NodeKind {
    pub fn classify(name: &str) -> Self {
        if name == DESCRIPTION_NAME {
            NodeKind::Description
        } else if name == ".DS_Store" || name.starts_with("._") {
            NodeKind::Special
        } else if name.starts_with('.') {
            NodeKind::Hidden
        } else {
            NodeKind::Content
        }
    }
}

/// Attributes reported for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub size: u64,
    pub perm: u16,
    pub kind: EntryKind,
    /// Last modification of the backing file; `None` for synthetic nodes.
    pub modified: Option<SystemTime>,
}

impl NodeAttr {
    fn file(size: u64, perm: u16) -> Self {
        NodeAttr {
            size,
            perm,
            kind: EntryKind::File,
            modified: None,
        }
    }
}

/// Access mode requested at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Raw `open(2)` flags as passed by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(i32);

impl OpenFlags {
    pub fn from_raw(flags: i32) -> Self {
        OpenFlags(flags)
    }

    pub fn read_only() -> Self {
        OpenFlags(libc::O_RDONLY)
    }

    pub fn write_only() -> Self {
        OpenFlags(libc::O_WRONLY)
    }

    pub fn read_write() -> Self {
        OpenFlags(libc::O_RDWR)
    }

    pub fn with_truncate(self) -> Self {
        OpenFlags(self.0 | libc::O_TRUNC)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }

    pub fn access(&self) -> AccessMode {
        match self.0 & libc::O_ACCMODE {
            libc::O_WRONLY => AccessMode::WriteOnly,
            libc::O_RDWR => AccessMode::ReadWrite,
            _ => AccessMode::ReadOnly,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.access() == AccessMode::ReadOnly
    }

    pub fn can_write(&self) -> bool {
        !self.is_read_only()
    }

    pub fn can_read(&self) -> bool {
        self.access() != AccessMode::WriteOnly
    }

    pub fn truncate(&self) -> bool {
        self.0 & libc::O_TRUNC != 0
    }

    fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.can_read())
            .write(self.can_write())
            .truncate(self.can_write() && self.truncate());
        options
    }
}

pub struct Node {
    library: Arc<Library>,
    container: Container,
    name: String,
    kind: NodeKind,
    special: Option<Arc<SpecialFileBuffer>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("container", &self.container)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Node {
    pub(crate) fn new(library: Arc<Library>, container: Container, name: String) -> Self {
        let kind = NodeKind::classify(&name);
        let special = match kind {
            NodeKind::Special => Some(library.specials().buffer_for(&container, &name)),
            _ => None,
        };
        Node {
            library,
            container,
            name,
            kind,
            special,
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Song name: the entry name without its extension.
    pub fn song(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Whether handles should bypass the page cache.
    pub fn direct_io(&self) -> bool {
        cfg!(target_os = "macos") && self.kind == NodeKind::Content
    }

    pub(crate) fn special_buffer(&self) -> Option<&Arc<SpecialFileBuffer>> {
        self.special.as_ref()
    }

    pub fn attr(&self) -> Result<NodeAttr, FsError> {
        match self.kind {
            NodeKind::Description => {
                let bytes = self.library.describe(&self.container)?;
                Ok(NodeAttr::file(bytes.len() as u64, SYNTHETIC_PERM))
            }
            NodeKind::Special => {
                if let Some(len) = self.special.as_ref().and_then(|b| b.active_len()) {
                    return Ok(NodeAttr::file(len, SPECIAL_PERM));
                }
                match self.stored_special()? {
                    Some(bytes) => Ok(NodeAttr::file(bytes.len() as u64, SPECIAL_PERM)),
                    None => Err(self.not_found()),
                }
            }
            NodeKind::Hidden => Err(self.not_found()),
            NodeKind::Content => {
                let path = self.real_path()?;
                let file = File::open(&path).map_err(|e| FsError::from_open(&path, e))?;
                let meta = file.metadata()?;
                Ok(NodeAttr {
                    modified: meta.modified().ok(),
                    ..NodeAttr::file(meta.len(), (meta.permissions().mode() & 0o7777) as u16)
                })
            }
        }
    }

    /// Open an existing entry. Dotfiles other than `.description` are refused;
    /// sidecar files are only reachable through [`Node::create`].
    pub fn open(self: &Arc<Self>, flags: OpenFlags) -> Result<Handle, FsError> {
        match self.kind {
            NodeKind::Description => {
                if flags.can_write() {
                    return Err(FsError::PermissionDenied(format!(
                        "{} is read-only",
                        DESCRIPTION_NAME
                    )));
                }
                Ok(Handle::synthetic(self.clone(), flags))
            }
            NodeKind::Special | NodeKind::Hidden => Err(FsError::PermissionDenied(format!(
                "{} in {}",
                self.name, self.container
            ))),
            NodeKind::Content => {
                let path = self.real_path()?;
                let file = flags
                    .options()
                    .open(&path)
                    .map_err(|e| FsError::from_open(&path, e))?;
                debug!(container = %self.container, name = %self.name, path = %path.display(), "opened");
                Ok(Handle::with_file(self.clone(), file, flags))
            }
        }
    }

    /// Create (or reopen) the entry for writing.
    pub fn create(self: &Arc<Self>, flags: OpenFlags) -> Result<Handle, FsError> {
        match self.kind {
            NodeKind::Description | NodeKind::Hidden => Err(FsError::PermissionDenied(format!(
                "cannot create {} in {}",
                self.name, self.container
            ))),
            NodeKind::Special => {
                if flags.can_write() {
                    let initial = if flags.truncate() {
                        Vec::new()
                    } else {
                        self.stored_special()?.unwrap_or_default()
                    };
                    if let Some(buffer) = &self.special {
                        let writers = buffer.acquire_writer(initial);
                        debug!(container = %self.container, name = %self.name, writers, "special file writer added");
                    }
                }
                Ok(Handle::synthetic(self.clone(), flags))
            }
            NodeKind::Content => {
                if matches!(self.container, Container::Artist(_)) {
                    return Err(FsError::PermissionDenied(format!(
                        "files cannot be placed directly in {}",
                        self.container
                    )));
                }
                let path = self.creation_path()?;
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(flags.truncate())
                    .open(&path)?;
                info!(container = %self.container, name = %self.name, path = %path.display(), "created");
                Ok(Handle::with_file(self.clone(), file, flags))
            }
        }
    }

    /// Size and mode changes are not applied; the current attributes are returned.
    pub fn setattr(&self, size: Option<u64>, mode: Option<u32>) -> Result<NodeAttr, FsError> {
        if size.is_some() || mode.is_some() {
            info!(
                container = %self.container,
                name = %self.name,
                ?size,
                ?mode,
                "attribute change requested; not applied"
            );
        }
        self.attr()
    }

    pub(crate) fn real_path(&self) -> Result<PathBuf, FsError> {
        self.library.resolver().resolve(&self.container, &self.name)
    }

    /// Recorded path when registered, else the fallback location.
    fn creation_path(&self) -> Result<PathBuf, FsError> {
        let resolver = self.library.resolver();
        Ok(match resolver.recorded_path(&self.container, &self.name)? {
            Some(path) => path,
            None => resolver.fallback_path(&self.container, &self.name),
        })
    }

    /// Persisted bytes of a sidecar file, if any.
    pub(crate) fn stored_special(&self) -> Result<Option<Vec<u8>>, FsError> {
        let bucket = self.container.bucket();
        Ok(self
            .library
            .store()
            .with_read::<_, crate::error::StoreError, _>(|tx| tx.get(&bucket, &self.name))?)
    }

    pub(crate) fn persist_special(&self, bytes: &[u8]) -> Result<(), FsError> {
        let bucket = self.container.bucket();
        self.library.store().with_write(|tx| {
            tx.ensure_bucket(&bucket)?;
            tx.put(&bucket, &self.name, bytes)
        })?;
        debug!(container = %self.container, name = %self.name, size = bytes.len(), "special file persisted");
        Ok(())
    }

    fn not_found(&self) -> FsError {
        FsError::NotFound(format!("{} in {}", self.name, self.container))
    }
}

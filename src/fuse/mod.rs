//! FUSE binding
//!
//! Translates kernel requests into namespace and node operations. Directory
//! structure comes from the metadata store; file operations go through
//! [`Node`](crate::node::Node) and [`Handle`](crate::node::Handle).

pub mod inode;
pub mod path;

use crate::config::MountConfig;
use crate::error::{ApiError, FsError};
use crate::library::Library;
use crate::node::{NodeAttr, OpenFlags};
use crate::types::{
    BucketPath, Container, DirEntry, EntryKind, DESCRIPTION_NAME, DROP_DIR, PLAYLISTS_DIR,
};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use inode::{HandleTable, InodeTable};
use libc::{EBADF, EINVAL, EISDIR, ENOENT, ENOTDIR, EPERM};
use path::VirtualPath;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const DIR_PERM: u16 = 0o755;
const BLOCK_SIZE: u32 = 4096;

pub struct LibraryFs {
    library: Arc<Library>,
    inodes: InodeTable,
    handles: HandleTable,
    ttl: Duration,
    mounted_at: SystemTime,
    uid: u32,
    gid: u32,
}

impl LibraryFs {
    pub fn new(library: Arc<Library>, ttl: Duration) -> Self {
        // SAFETY: getuid/getgid have no preconditions and cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            library,
            inodes: InodeTable::new(),
            handles: HandleTable::new(),
            ttl,
            mounted_at: SystemTime::now(),
            uid,
            gid,
        }
    }

    fn dir_attr(&self, ino: u64) -> FileAttr {
        self.attr(ino, FileType::Directory, 0, DIR_PERM, 2, self.mounted_at)
    }

    fn file_attr(&self, ino: u64, node: &NodeAttr) -> FileAttr {
        let kind = file_type(node.kind);
        let modified = node.modified.unwrap_or(self.mounted_at);
        self.attr(ino, kind, node.size, node.perm, 1, modified)
    }

    fn attr(
        &self,
        ino: u64,
        kind: FileType,
        size: u64,
        perm: u16,
        nlink: u32,
        modified: SystemTime,
    ) -> FileAttr {
        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: modified,
            mtime: modified,
            ctime: modified,
            crtime: self.mounted_at,
            kind,
            perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Attributes of `path`, checking that it exists.
    fn stat(&self, ino: u64, path: &VirtualPath) -> Result<FileAttr, i32> {
        match path {
            VirtualPath::Root | VirtualPath::PlaylistsDir | VirtualPath::DropDir => {
                Ok(self.dir_attr(ino))
            }
            VirtualPath::Dir(container) => match self.library.container_exists(container) {
                Ok(true) => Ok(self.dir_attr(ino)),
                Ok(false) => Err(ENOENT),
                Err(err) => Err(log_errno("stat", &err)),
            },
            VirtualPath::Entry { container, name } => {
                let node = self.library.node(container.clone(), name.as_str());
                node.attr()
                    .map(|attr| self.file_attr(ino, &attr))
                    .map_err(|err| log_errno("stat", &err))
            }
        }
    }

    fn resolve_child(&self, parent: u64, name: &OsStr) -> Result<VirtualPath, i32> {
        let parent_path = self.inodes.path(parent).ok_or(ENOENT)?;
        if !parent_path.is_dir() {
            return Err(ENOTDIR);
        }
        let name = name.to_str().ok_or(EINVAL)?;
        parent_path.child(name).ok_or(ENOENT)
    }

    fn entry_path(&self, ino: u64) -> Result<VirtualPath, i32> {
        let path = self.inodes.path(ino).ok_or(ENOENT)?;
        if path.is_dir() {
            return Err(EISDIR);
        }
        Ok(path)
    }

    fn list(&self, path: &VirtualPath) -> Result<Vec<DirEntry>, FsError> {
        let listing = self.library.listing();
        let mut entries = match path {
            VirtualPath::Root => {
                let mut entries = vec![
                    DirEntry::directory(PLAYLISTS_DIR),
                    DirEntry::directory(DROP_DIR),
                ];
                entries.extend(listing.list_containers(&BucketPath::artists())?);
                return Ok(entries);
            }
            VirtualPath::PlaylistsDir => return listing.list_playlists(),
            VirtualPath::Dir(container @ Container::Artist(_)) => {
                listing.list_containers(&container.bucket())?
            }
            VirtualPath::Dir(container) => listing.list_entries(container)?,
            VirtualPath::DropDir => listing.list_entries(&Container::Drop)?,
            VirtualPath::Entry { .. } => {
                return Err(FsError::NotFound("not a directory".to_string()));
            }
        };
        entries.retain(|entry| entry.name != DESCRIPTION_NAME);
        entries.insert(0, DirEntry::file(DESCRIPTION_NAME));
        Ok(entries)
    }

    fn open_flags(&self, direct_io: bool) -> u32 {
        if direct_io {
            fuser::consts::FOPEN_DIRECT_IO
        } else {
            0
        }
    }
}

fn log_errno(op: &str, err: &FsError) -> i32 {
    match err {
        FsError::NotFound(_) => debug!(op, error = %err, "request failed"),
        _ => warn!(op, error = %err, "request failed"),
    }
    err.errno()
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::File => FileType::RegularFile,
    }
}

impl Filesystem for LibraryFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        info!(root = %self.library.root().display(), "filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!(open_handles = self.handles.len(), "filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.resolve_child(parent, name) {
            Ok(path) => path,
            Err(code) => {
                reply.error(code);
                return;
            }
        };
        let ino = self.inodes.get_or_create(&path);
        match self.stat(ino, &path) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(code) => reply.error(code),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(ENOENT);
            return;
        };
        match self.stat(ino, &path) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(code) => reply.error(code),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(ENOENT);
            return;
        };
        let VirtualPath::Entry { container, name } = &path else {
            match self.stat(ino, &path) {
                Ok(attr) => reply.attr(&self.ttl, &attr),
                Err(code) => reply.error(code),
            }
            return;
        };
        let node = self.library.node(container.clone(), name.as_str());
        match node.setattr(size, mode) {
            Ok(attr) => reply.attr(&self.ttl, &self.file_attr(ino, &attr)),
            Err(err) => reply.error(log_errno("setattr", &err)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        if self.inodes.path(parent) != Some(VirtualPath::PlaylistsDir) {
            reply.error(EPERM);
            return;
        }
        let Some(name) = name.to_str() else {
            reply.error(EINVAL);
            return;
        };
        let created = match self.library.playlists().create_playlist(name) {
            Ok(created) => created,
            Err(err) => {
                reply.error(log_errno("mkdir", &FsError::from(err)));
                return;
            }
        };
        let path = VirtualPath::Dir(Container::Playlist(created));
        let ino = self.inodes.get_or_create(&path);
        reply.entry(&self.ttl, &self.dir_attr(ino), 0);
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.entry_path(ino) {
            Ok(path) => path,
            Err(code) => {
                reply.error(code);
                return;
            }
        };
        let VirtualPath::Entry { container, name } = path else {
            reply.error(EISDIR);
            return;
        };
        let node = self.library.node(container, name);
        match node.open(OpenFlags::from_raw(flags)) {
            Ok(handle) => {
                let open_flags = self.open_flags(node.direct_io());
                let fh = self.handles.insert(handle);
                reply.opened(fh, open_flags);
            }
            Err(err) => reply.error(log_errno("open", &err)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.resolve_child(parent, name) {
            Ok(path) => path,
            Err(code) => {
                reply.error(if code == ENOENT { EPERM } else { code });
                return;
            }
        };
        let VirtualPath::Entry { container, name } = &path else {
            reply.error(EPERM);
            return;
        };
        let node = self.library.node(container.clone(), name.as_str());
        let handle = match node.create(OpenFlags::from_raw(flags)) {
            Ok(handle) => handle,
            Err(err) => {
                reply.error(log_errno("create", &err));
                return;
            }
        };
        let attr = match node.attr() {
            Ok(attr) => attr,
            Err(err) => {
                let code = log_errno("create", &err);
                if let Err(err) = handle.release() {
                    warn!(error = %err, "release after failed create");
                }
                reply.error(code);
                return;
            }
        };
        let ino = self.inodes.get_or_create(&path);
        let open_flags = self.open_flags(node.direct_io());
        let fh = self.handles.insert(handle);
        reply.created(&self.ttl, &self.file_attr(ino, &attr), 0, fh, open_flags);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(handle) = self.handles.get(fh) else {
            reply.error(EBADF);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(EINVAL);
            return;
        };
        match handle.read(offset, size) {
            Ok(bytes) => reply.data(&bytes),
            Err(err) => reply.error(log_errno("read", &err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(handle) = self.handles.get(fh) else {
            reply.error(EBADF);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(EINVAL);
            return;
        };
        match handle.write(offset, data) {
            Ok(written) => reply.written(written as u32),
            Err(err) => reply.error(log_errno("write", &err)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let Some(handle) = self.handles.get(fh) else {
            reply.error(EBADF);
            return;
        };
        match handle.flush() {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(log_errno("flush", &err)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let Some(handle) = self.handles.remove(fh) else {
            reply.error(EBADF);
            return;
        };
        let handle = match Arc::try_unwrap(handle) {
            Ok(handle) => handle,
            Err(_) => {
                // Requests are dispatched one at a time, so this should not happen.
                warn!(fh, "handle still in use at release; closing on last reference");
                reply.ok();
                return;
            }
        };
        match handle.release() {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(log_errno("release", &err)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.inodes.path(ino) else {
            reply.error(ENOENT);
            return;
        };
        if !path.is_dir() {
            reply.error(ENOTDIR);
            return;
        }
        let entries = match self.list(&path) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(log_errno("readdir", &err));
                return;
            }
        };

        let parent_ino = {
            let mut segments = path.segments();
            segments.pop();
            VirtualPath::parse(&segments)
                .map(|parent| self.inodes.get_or_create(&parent))
                .unwrap_or(ino)
        };
        let mut listed: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for entry in entries {
            let Some(child) = path.child(&entry.name) else {
                debug!(name = %entry.name, "skipping entry outside the namespace");
                continue;
            };
            let child_ino = self.inodes.get_or_create(&child);
            listed.push((child_ino, file_type(entry.kind), entry.name));
        }

        let skip = usize::try_from(offset).unwrap_or(0);
        for (idx, (child_ino, kind, name)) in listed.into_iter().enumerate().skip(skip) {
            if reply.add(child_ino, (idx + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }
}

/// Mount options derived from configuration.
pub fn mount_options(config: &MountConfig) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName(config.fs_name.clone()),
        MountOption::Subtype("mulifs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    #[cfg(not(target_os = "macos"))]
    if config.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }
    options
}

/// Mount `library` at `mountpoint` and serve requests until unmounted.
pub fn mount(library: Arc<Library>, mountpoint: &Path, config: &MountConfig) -> Result<(), ApiError> {
    library.ensure_layout().map_err(FsError::from)?;
    let ttl = Duration::from_secs(config.attr_ttl_secs);
    let filesystem = LibraryFs::new(library.clone(), ttl);
    let options = mount_options(config);
    info!(
        mountpoint = %mountpoint.display(),
        root = %library.root().display(),
        store = %library.store().path().display(),
        "mounting"
    );
    fuser::mount2(filesystem, mountpoint, &options)
        .map_err(|err| ApiError::Mount(format!("{}: {}", mountpoint.display(), err)))?;
    info!(mountpoint = %mountpoint.display(), "unmounted");
    Ok(())
}

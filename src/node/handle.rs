//! Open handles
//!
//! A handle owns the real file descriptor for content nodes; description and
//! sidecar handles have none and are served from memory or the store.

use super::special::{window, SpecialWriteError, MAX_SPECIAL_FILE_SIZE};
use super::{Node, NodeKind, OpenFlags};
use crate::error::FsError;
use crate::ingest::is_recognized_audio;
use crate::types::Container;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::os::unix::io::IntoRawFd;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Handle {
    node: Arc<Node>,
    file: Option<File>,
    flags: OpenFlags,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("node", &self.node)
            .field("descriptor", &self.file.is_some())
            .field("flags", &self.flags)
            .finish()
    }
}

impl Handle {
    pub(crate) fn synthetic(node: Arc<Node>, flags: OpenFlags) -> Self {
        Handle {
            node,
            file: None,
            flags,
        }
    }

    pub(crate) fn with_file(node: Arc<Node>, file: File, flags: OpenFlags) -> Self {
        Handle {
            node,
            file: Some(file),
            flags,
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn has_descriptor(&self) -> bool {
        self.file.is_some()
    }

    /// Up to `size` bytes starting at `offset`; short at end of file.
    pub fn read(&self, offset: u64, size: u32) -> Result<Vec<u8>, FsError> {
        if let Some(file) = &self.file {
            return read_at(file, offset, size).map_err(FsError::from);
        }
        match self.node.kind() {
            NodeKind::Description => {
                let bytes = self.node.library().describe(self.node.container())?;
                Ok(window(&bytes, offset, Some(size)))
            }
            NodeKind::Special => {
                if let Some(bytes) = self
                    .node
                    .special_buffer()
                    .and_then(|buffer| buffer.read_at(offset, size))
                {
                    return Ok(bytes);
                }
                match self.node.stored_special()? {
                    Some(bytes) => Ok(window(&bytes, offset, Some(size))),
                    None => Err(FsError::NotFound(self.node.name().to_string())),
                }
            }
            _ => Err(no_descriptor()),
        }
    }

    /// Positional write of all of `data`; returns the number of bytes written.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        if !self.flags.can_write() {
            return Err(FsError::PermissionDenied(format!(
                "{} was opened read-only",
                self.node.name()
            )));
        }
        if let Some(file) = &self.file {
            file.write_all_at(data, offset)?;
            return Ok(data.len());
        }
        match self.node.kind() {
            NodeKind::Special => {
                let buffer = self.node.special_buffer().ok_or_else(no_descriptor)?;
                buffer.write_at(offset, data).map_err(|err| match err {
                    SpecialWriteError::NoWriter => no_descriptor(),
                    SpecialWriteError::TooLarge { offset, len } => FsError::TooLarge {
                        name: self.node.name().to_string(),
                        size: offset.saturating_add(len as u64),
                        limit: MAX_SPECIAL_FILE_SIZE,
                    },
                    SpecialWriteError::OutOfMemory => {
                        FsError::Io(io::Error::from(io::ErrorKind::OutOfMemory))
                    }
                })
            }
            NodeKind::Description => Err(FsError::PermissionDenied(format!(
                "{} is read-only",
                self.node.name()
            ))),
            _ => Err(no_descriptor()),
        }
    }

    /// Sync content to disk, or persist a sidecar buffer to the store.
    ///
    /// Description handles have nothing to flush. A sidecar handle without
    /// write access has no buffer of its own and fails like any other
    /// descriptor-less handle.
    pub fn flush(&self) -> Result<(), FsError> {
        if let Some(file) = &self.file {
            file.sync_all()?;
            return Ok(());
        }
        match self.node.kind() {
            NodeKind::Description => Ok(()),
            NodeKind::Special if self.flags.can_write() => {
                if let Some(bytes) = self.node.special_buffer().and_then(|b| b.snapshot()) {
                    self.node.persist_special(&bytes)?;
                }
                Ok(())
            }
            _ => Err(no_descriptor()),
        }
    }

    /// Close the handle and run the container's post-close work.
    ///
    /// Drop-area files are handed to the drop handler and recognized audio
    /// files in an album get their tags rewritten. Those failures take
    /// precedence over a failed close.
    pub fn release(self) -> Result<(), FsError> {
        let Handle { node, file, flags } = self;
        let Some(file) = file else {
            release_synthetic(&node, flags);
            return Ok(());
        };

        if node.container().is_drop() {
            let closed = close_descriptor(file);
            let dropped = node
                .library()
                .resolver()
                .fallback_path(&Container::Drop, node.name());
            info!(path = %dropped.display(), "ingesting dropped file");
            node.library().drop_handler().ingest(&dropped)?;
            return closed.map_err(FsError::from);
        }

        let Some((artist, album)) = node.container().album_context() else {
            debug!(container = %node.container(), name = %node.name(), "closing");
            return close_descriptor(file).map_err(FsError::from);
        };

        let closed = close_descriptor(file);
        if is_recognized_audio(node.name()) {
            let path = node.real_path()?;
            node.library()
                .tag_rewriter()
                .rewrite_tags(artist, album, &node.song(), &path)?;
        }
        closed.map_err(FsError::from)
    }
}

fn release_synthetic(node: &Node, flags: OpenFlags) {
    if node.kind() != NodeKind::Special || flags.is_read_only() {
        return;
    }
    if let Some(buffer) = node.special_buffer() {
        let remaining = buffer.release_writer();
        debug!(container = %node.container(), name = %node.name(), remaining, "special file writer released");
    }
}

fn read_at(file: &File, offset: u64, size: u32) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; size as usize];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Close explicitly so the result of `close(2)` is observed.
fn close_descriptor(file: File) -> io::Result<()> {
    let fd = file.into_raw_fd();
    // SAFETY: `fd` was just taken out of an owned `File`; nothing else refers to it.
    if unsafe { libc::close(fd) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn no_descriptor() -> FsError {
    FsError::Io(io::Error::new(
        io::ErrorKind::Other,
        "handle has no backing descriptor",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{DropHandler, TagRewriter};
    use crate::library::Library;
    use crate::types::DESCRIPTION_NAME;
    use parking_lot::Mutex;
    use std::fs;
    use std::path::{Path, PathBuf};

    #[derive(Default)]
    struct RecordingDrop {
        seen: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl DropHandler for RecordingDrop {
        fn ingest(&self, dropped: &Path) -> Result<(), FsError> {
            self.seen.lock().push(dropped.to_path_buf());
            if self.fail {
                return Err(FsError::Unreadable("ingest refused".into()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTags {
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl TagRewriter for RecordingTags {
        fn rewrite_tags(&self, artist: &str, album: &str, song: &str, _: &Path) -> Result<(), FsError> {
            self.calls
                .lock()
                .push((artist.into(), album.into(), song.into()));
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        library: Arc<Library>,
        drops: Arc<RecordingDrop>,
        tags: Arc<RecordingTags>,
    }

    fn fixture(fail_drop: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let drops = Arc::new(RecordingDrop {
            fail: fail_drop,
            ..Default::default()
        });
        let tags = Arc::new(RecordingTags::default());
        let library = Library::builder(dir.path().join("store"), dir.path().join("root"))
            .drop_handler(drops.clone())
            .tag_rewriter(tags.clone())
            .build();
        library.ensure_layout().unwrap();
        Fixture {
            _dir: dir,
            library,
            drops,
            tags,
        }
    }

    #[test]
    fn test_content_write_read_flush() {
        let fx = fixture(false);
        let mix = Container::Playlist("mix".into());
        let node = fx.library.node(mix.clone(), "notes.txt");
        let handle = node.create(OpenFlags::read_write()).unwrap();
        assert_eq!(handle.write(0, b"hello world").unwrap(), 11);
        handle.flush().unwrap();
        assert_eq!(handle.read(6, 100).unwrap(), b"world".to_vec());
        handle.release().unwrap();

        let reopened = fx.library.node(mix, "notes.txt").open(OpenFlags::read_only()).unwrap();
        assert_eq!(reopened.read(0, 5).unwrap(), b"hello".to_vec());
        assert!(reopened.write(0, b"x").is_err());
        reopened.release().unwrap();
    }

    #[test]
    fn test_description_read_honors_offset() {
        let fx = fixture(false);
        fx.library.playlists().create_playlist("mix").unwrap();
        let node = fx
            .library
            .node(Container::Playlist("mix".into()), DESCRIPTION_NAME);
        let handle = node.open(OpenFlags::read_only()).unwrap();
        let whole = handle.read(0, 4096).unwrap();
        assert!(!whole.is_empty());
        assert_eq!(handle.read(2, 4096).unwrap(), whole[2..].to_vec());
        assert!(handle.write(0, b"x").is_err());
        handle.release().unwrap();
    }

    #[test]
    fn test_special_file_survives_until_last_writer() {
        let fx = fixture(false);
        let node = fx.library.node(Container::Drop, ".DS_Store");
        let first = node.create(OpenFlags::read_write()).unwrap();
        let second = node.create(OpenFlags::write_only()).unwrap();

        first.write(0, b"finder").unwrap();
        assert_eq!(node.attr().unwrap().size, 6);
        first.release().unwrap();

        // Still buffered for the remaining writer.
        assert_eq!(second.read(0, 64).unwrap(), b"finder".to_vec());
        second.flush().unwrap();
        second.release().unwrap();

        let buffer = node.special_buffer().unwrap();
        assert_eq!(buffer.writers(), 0);
        assert!(!buffer.has_buffer());
        // Served from the store after the buffer is gone.
        assert_eq!(node.attr().unwrap().size, 6);
        assert!(fx.drops.seen.lock().is_empty());
    }

    #[test]
    fn test_special_file_reopen_keeps_stored_bytes() {
        let fx = fixture(false);
        let node = fx.library.node(Container::Drop, "._cover.jpg");
        let handle = node.create(OpenFlags::write_only()).unwrap();
        handle.write(0, b"resource").unwrap();
        handle.flush().unwrap();
        handle.release().unwrap();

        let again = node.create(OpenFlags::read_write()).unwrap();
        again.write(0, b"R").unwrap();
        assert_eq!(again.read(0, 64).unwrap(), b"Resource".to_vec());
        again.release().unwrap();
    }

    #[test]
    fn test_drop_release_hands_file_to_ingestion() {
        let fx = fixture(false);
        let node = fx.library.node(Container::Drop, "new.mp3");
        let handle = node.create(OpenFlags::write_only()).unwrap();
        handle.write(0, b"audio").unwrap();
        handle.release().unwrap();

        let seen = fx.drops.seen.lock();
        assert_eq!(*seen, vec![fx.library.root().join("drop").join("new.mp3")]);
    }

    #[test]
    fn test_drop_release_reports_ingestion_failure() {
        let fx = fixture(true);
        let node = fx.library.node(Container::Drop, "bad.mp3");
        let handle = node.create(OpenFlags::write_only()).unwrap();
        let err = handle.release().unwrap_err();
        assert!(matches!(err, FsError::Unreadable(_)));
        assert_eq!(fx.drops.seen.lock().len(), 1);
    }

    #[test]
    fn test_drop_release_closes_descriptor_when_ingestion_fails() {
        let fx = fixture(true);
        let node = fx.library.node(Container::Drop, "stuck.mp3");
        let handle = node.create(OpenFlags::write_only()).unwrap();
        let path = fs::canonicalize(fx.library.root().join("drop").join("stuck.mp3")).unwrap();
        assert_eq!(open_descriptors_for(&path), 1);

        assert!(handle.release().is_err());
        assert_eq!(open_descriptors_for(&path), 0);
    }

    /// Entries of `/proc/self/fd` pointing at `path`.
    fn open_descriptors_for(path: &Path) -> usize {
        fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| fs::read_link(entry.path()).map_or(false, |target| target == path))
            .count()
    }

    #[test]
    fn test_album_release_rewrites_tags_for_recognized_audio() {
        let fx = fixture(false);
        let album = Container::album("Queen", "Jazz");
        let dir = album.fallback_dir(fx.library.root());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Mustapha.mp3"), b"audio").unwrap();
        fs::write(dir.join("booklet.pdf"), b"pdf").unwrap();

        let node = fx.library.node(album.clone(), "Mustapha.mp3");
        node.open(OpenFlags::read_only()).unwrap().release().unwrap();
        node.open(OpenFlags::read_write()).unwrap().release().unwrap();
        fx.library
            .node(album, "booklet.pdf")
            .open(OpenFlags::read_write())
            .unwrap()
            .release()
            .unwrap();

        let expected = ("Queen".to_string(), "Jazz".to_string(), "Mustapha".to_string());
        assert_eq!(*fx.tags.calls.lock(), vec![expected.clone(), expected]);
    }

    #[test]
    fn test_special_write_far_past_limit_is_refused() {
        let fx = fixture(false);
        let node = fx.library.node(Container::Drop, ".DS_Store");
        let handle = node.create(OpenFlags::read_write()).unwrap();
        let err = handle.write(1u64 << 62, b"x").unwrap_err();
        assert!(matches!(err, FsError::TooLarge { .. }));
        assert_eq!(err.errno(), libc::EFBIG);
        assert_eq!(handle.write(0, b"ok").unwrap(), 2);
        assert_eq!(node.attr().unwrap().size, 2);
        handle.release().unwrap();
    }

    #[test]
    fn test_flush_by_handle_kind() {
        let fx = fixture(false);
        fx.library.playlists().create_playlist("mix").unwrap();
        let mix = Container::Playlist("mix".into());

        let description = fx.library.node(mix.clone(), DESCRIPTION_NAME);
        let handle = description.open(OpenFlags::read_only()).unwrap();
        handle.flush().unwrap();
        handle.release().unwrap();

        let sidecar = fx.library.node(mix.clone(), ".DS_Store");
        let writer = sidecar.create(OpenFlags::write_only()).unwrap();
        writer.write(0, b"finder").unwrap();
        writer.flush().unwrap();
        writer.release().unwrap();
        let reader = sidecar.create(OpenFlags::read_only()).unwrap();
        assert_eq!(reader.flush().unwrap_err().errno(), libc::EIO);
        reader.release().unwrap();

        let song = fx.library.node(mix, "a.mp3");
        song.create(OpenFlags::read_write()).unwrap().release().unwrap();
        let content = song.open(OpenFlags::read_only()).unwrap();
        content.flush().unwrap();
        content.release().unwrap();
    }

    #[test]
    fn test_playlist_release_just_closes() {
        let fx = fixture(false);
        let node = fx.library.node(Container::Playlist("mix".into()), "a.mp3");
        node.create(OpenFlags::read_write()).unwrap().release().unwrap();
        assert!(fx.tags.calls.lock().is_empty());
        assert!(fx.drops.seen.lock().is_empty());
    }
}

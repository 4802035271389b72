//! In-memory buffers for operating-system sidecar files
//!
//! Sidecar files (`.DS_Store`, `._*`) are kept in memory while they are being
//! written and persisted to the metadata store on flush. Each buffer is shared
//! by every handle on the same `(container, name)`; the registry hands out one
//! canonical buffer per pair.

use crate::types::Container;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Largest sidecar file kept in memory.
pub const MAX_SPECIAL_FILE_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecialWriteError {
    #[error("no active writer")]
    NoWriter,

    #[error("write of {len} bytes at offset {offset} exceeds the sidecar size limit")]
    TooLarge { offset: u64, len: usize },

    #[error("could not grow sidecar buffer")]
    OutOfMemory,
}

#[derive(Debug, Default)]
struct SpecialState {
    writers: usize,
    /// Present exactly while `writers > 0`.
    data: Option<Vec<u8>>,
}

/// Writer-counted buffer; count and bytes change together under one lock.
#[derive(Debug, Default)]
pub struct SpecialFileBuffer {
    state: Mutex<SpecialState>,
}

impl SpecialFileBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a writer. The first writer seeds the buffer with `initial`.
    /// Returns the new writer count.
    pub fn acquire_writer(&self, initial: Vec<u8>) -> usize {
        let mut state = self.state.lock();
        if state.writers == 0 {
            state.data = Some(initial);
        }
        state.writers += 1;
        state.writers
    }

    /// Drop a writer; the buffer is discarded when the last one leaves.
    /// Returns the remaining writer count.
    pub fn release_writer(&self) -> usize {
        let mut state = self.state.lock();
        if state.writers == 0 {
            warn!("special file released with no active writer");
            return 0;
        }
        state.writers -= 1;
        if state.writers == 0 {
            state.data = None;
        }
        state.writers
    }

    pub fn writers(&self) -> usize {
        self.state.lock().writers
    }

    pub fn has_buffer(&self) -> bool {
        self.state.lock().data.is_some()
    }

    /// Current buffered size, `None` when no writer is active.
    pub fn active_len(&self) -> Option<u64> {
        self.state.lock().data.as_ref().map(|d| d.len() as u64)
    }

    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.state.lock().data.clone()
    }

    pub fn read_at(&self, offset: u64, size: u32) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .data
            .as_deref()
            .map(|data| window(data, offset, Some(size)))
    }

    /// Positional write, zero-filling any gap. The buffer never grows past
    /// [`MAX_SPECIAL_FILE_SIZE`].
    pub fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<usize, SpecialWriteError> {
        let mut state = self.state.lock();
        let data = state.data.as_mut().ok_or(SpecialWriteError::NoWriter)?;
        let too_large = || SpecialWriteError::TooLarge {
            offset,
            len: bytes.len(),
        };
        let end = u64::try_from(bytes.len())
            .ok()
            .and_then(|len| offset.checked_add(len))
            .filter(|end| *end <= MAX_SPECIAL_FILE_SIZE)
            .ok_or_else(too_large)?;
        let start = usize::try_from(offset).map_err(|_| too_large())?;
        let end = usize::try_from(end).map_err(|_| too_large())?;
        if data.len() < end {
            data.try_reserve(end - data.len())
                .map_err(|_| SpecialWriteError::OutOfMemory)?;
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(bytes.len())
    }
}

/// Slice of `data` starting at `offset`, at most `size` bytes when given.
pub(crate) fn window(data: &[u8], offset: u64, size: Option<u32>) -> Vec<u8> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
    let end = match size {
        Some(size) => start.saturating_add(size as usize).min(data.len()),
        None => data.len(),
    };
    data[start..end].to_vec()
}

/// Canonical buffer per sidecar file.
#[derive(Default)]
pub struct SpecialFileRegistry {
    buffers: RwLock<HashMap<(Container, String), Arc<SpecialFileBuffer>>>,
}

impl SpecialFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the buffer for `name` in `container`.
    pub fn buffer_for(&self, container: &Container, name: &str) -> Arc<SpecialFileBuffer> {
        let key = (container.clone(), name.to_string());
        {
            let map = self.buffers.read();
            if let Some(buffer) = map.get(&key) {
                return buffer.clone();
            }
        }

        // Another thread may have inserted between the two locks.
        let mut map = self.buffers.write();
        map.entry(key)
            .or_insert_with(|| Arc::new(SpecialFileBuffer::new()))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.buffers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_buffer_lives_while_writers_remain() {
        let buffer = SpecialFileBuffer::new();
        assert!(!buffer.has_buffer());
        assert_eq!(buffer.acquire_writer(Vec::new()), 1);
        assert_eq!(buffer.acquire_writer(b"ignored".to_vec()), 2);
        assert_eq!(buffer.write_at(0, b"abc"), Ok(3));

        assert_eq!(buffer.release_writer(), 1);
        assert_eq!(buffer.snapshot().as_deref(), Some(&b"abc"[..]));

        assert_eq!(buffer.release_writer(), 0);
        assert!(!buffer.has_buffer());
        assert_eq!(buffer.active_len(), None);
    }

    #[test]
    fn test_write_without_writer_is_refused() {
        let buffer = SpecialFileBuffer::new();
        assert_eq!(buffer.write_at(0, b"x"), Err(SpecialWriteError::NoWriter));
        assert_eq!(buffer.release_writer(), 0);
    }

    #[test]
    fn test_positional_writes_zero_fill() {
        let buffer = SpecialFileBuffer::new();
        buffer.acquire_writer(b"ab".to_vec());
        buffer.write_at(4, b"z").unwrap();
        assert_eq!(buffer.snapshot().unwrap(), b"ab\0\0z".to_vec());
        assert_eq!(buffer.read_at(1, 2).unwrap(), b"b\0".to_vec());
        assert_eq!(buffer.read_at(10, 2).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_far_offset_write_is_refused_without_growing() {
        let buffer = SpecialFileBuffer::new();
        buffer.acquire_writer(b"ab".to_vec());
        assert_eq!(
            buffer.write_at(1 << 62, b"x"),
            Err(SpecialWriteError::TooLarge {
                offset: 1 << 62,
                len: 1
            })
        );
        assert_eq!(
            buffer.write_at(u64::MAX, b"x"),
            Err(SpecialWriteError::TooLarge {
                offset: u64::MAX,
                len: 1
            })
        );
        assert!(buffer.write_at(MAX_SPECIAL_FILE_SIZE, b"x").is_err());
        assert_eq!(buffer.active_len(), Some(2));

        assert_eq!(buffer.write_at(MAX_SPECIAL_FILE_SIZE - 1, b"x"), Ok(1));
        assert_eq!(buffer.active_len(), Some(MAX_SPECIAL_FILE_SIZE));
    }

    #[test]
    fn test_concurrent_writers_balance_to_zero() {
        let buffer = Arc::new(SpecialFileBuffer::new());
        let mut handles = vec![];
        for i in 0..8u8 {
            let buffer = buffer.clone();
            handles.push(thread::spawn(move || {
                buffer.acquire_writer(Vec::new());
                buffer.write_at(i as u64, &[i]).unwrap();
                thread::yield_now();
                buffer.release_writer();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(buffer.writers(), 0);
        assert!(!buffer.has_buffer());
    }

    #[test]
    fn test_registry_returns_canonical_buffer() {
        let registry = Arc::new(SpecialFileRegistry::new());
        let container = Container::Playlist("mix".into());
        let mut handles = vec![];
        for _ in 0..6 {
            let registry = registry.clone();
            let container = container.clone();
            handles.push(thread::spawn(move || registry.buffer_for(&container, ".DS_Store")));
        }
        let buffers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(buffers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);

        let other = registry.buffer_for(&Container::Drop, ".DS_Store");
        assert!(!Arc::ptr_eq(&other, &buffers[0]));
    }

    #[test]
    fn test_window_bounds() {
        assert_eq!(window(b"hello", 1, Some(3)), b"ell".to_vec());
        assert_eq!(window(b"hello", 3, None), b"lo".to_vec());
        assert_eq!(window(b"hello", 9, Some(3)), Vec::<u8>::new());
    }
}

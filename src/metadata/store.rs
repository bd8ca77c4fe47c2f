//! In-memory metadata store
//!
//! Non-paged metadata sits behind the NP lock. Callers get at it only
//! through `with_nonpaged_locked`, which keeps the lock scope to a closure
//! so it can never be carried across an I/O.

use std::sync::{Mutex, MutexGuard};

use super::errors::{MetadataError, MetadataResult};
use super::nonpaged::NonPagedMetadata;
use super::paged::PagedChunkMap;

pub struct MetadataStore {
    nonpaged: Mutex<NonPagedMetadata>,
    paged: Mutex<PagedChunkMap>,
    persisted: Mutex<Option<Vec<u8>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MetadataStore {
    pub fn new(width: u32, user_chunks: u64) -> Self {
        Self {
            nonpaged: Mutex::new(NonPagedMetadata::new(width)),
            paged: Mutex::new(PagedChunkMap::new(user_chunks)),
            persisted: Mutex::new(None),
        }
    }

    /// Run `f` with the NP lock held.
    pub fn with_nonpaged_locked<R>(&self, f: impl FnOnce(&mut NonPagedMetadata) -> R) -> R {
        let mut guard = lock(&self.nonpaged);
        f(&mut guard)
    }

    /// Best-effort copy for readers outside a verify cycle.
    pub fn nonpaged_snapshot(&self) -> NonPagedMetadata {
        lock(&self.nonpaged).clone()
    }

    /// Persist the current non-paged metadata as a checksummed record.
    pub fn write_persist(&self) -> MetadataResult<()> {
        let record = self.with_nonpaged_locked(|md| md.encode())?;
        *lock(&self.persisted) = Some(record);
        Ok(())
    }

    /// Read back and validate the persisted record.
    pub fn read_persisted(&self) -> MetadataResult<NonPagedMetadata> {
        let persisted = lock(&self.persisted);
        let record = persisted.as_ref().ok_or(MetadataError::NotPersisted)?;
        NonPagedMetadata::decode(record)
    }

    /// Replace the in-memory copy with the persisted record.
    pub fn reload(&self) -> MetadataResult<()> {
        let md = self.read_persisted()?;
        self.with_nonpaged_locked(|current| *current = md);
        Ok(())
    }

    pub fn paged_chunk_count(&self) -> u64 {
        lock(&self.paged).chunk_count()
    }

    pub fn resize_paged(&self, user_chunks: u64) {
        lock(&self.paged).resize(user_chunks);
    }

    pub fn chunk_bits(&self, chunk: u64) -> MetadataResult<u8> {
        lock(&self.paged).bits(chunk)
    }

    pub fn set_bits(&self, first_chunk: u64, count: u64, mask: u8) -> MetadataResult<()> {
        lock(&self.paged).set_bits(first_chunk, count, mask)
    }

    pub fn clear_bits(&self, first_chunk: u64, count: u64, mask: u8) -> MetadataResult<()> {
        lock(&self.paged).clear_bits(first_chunk, count, mask)
    }

    /// Corrupt the persisted record in place. Test support for checksum paths.
    #[cfg(test)]
    pub(crate) fn corrupt_persisted(&self) {
        if let Some(record) = lock(&self.persisted).as_mut() {
            if let Some(byte) = record.last_mut() {
                *byte ^= 0xff;
            }
        }
    }
}

//! Paged metadata: one verify bitmap entry per user chunk

use super::errors::{MetadataError, MetadataResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagedChunkMap {
    verify_bits: Vec<u8>,
}

impl PagedChunkMap {
    pub fn new(chunks: u64) -> Self {
        Self {
            verify_bits: vec![0; chunks as usize],
        }
    }

    pub fn chunk_count(&self) -> u64 {
        self.verify_bits.len() as u64
    }

    /// Grow or shrink to `chunks` entries. Surviving entries keep their bits.
    pub fn resize(&mut self, chunks: u64) {
        self.verify_bits.resize(chunks as usize, 0);
    }

    pub fn bits(&self, chunk: u64) -> MetadataResult<u8> {
        self.verify_bits
            .get(chunk as usize)
            .copied()
            .ok_or_else(|| self.out_of_range(chunk, chunk + 1))
    }

    pub fn set_bits(&mut self, first: u64, count: u64, mask: u8) -> MetadataResult<()> {
        for bits in self.entries_mut(first, count)? {
            *bits |= mask;
        }
        Ok(())
    }

    pub fn clear_bits(&mut self, first: u64, count: u64, mask: u8) -> MetadataResult<()> {
        for bits in self.entries_mut(first, count)? {
            *bits &= !mask;
        }
        Ok(())
    }

    fn entries_mut(&mut self, first: u64, count: u64) -> MetadataResult<&mut [u8]> {
        let end = first.saturating_add(count);
        if end > self.chunk_count() {
            return Err(self.out_of_range(first, end));
        }
        Ok(&mut self.verify_bits[first as usize..end as usize])
    }

    fn out_of_range(&self, first: u64, end: u64) -> MetadataError {
        MetadataError::ChunkOutOfRange {
            first,
            end,
            chunks: self.chunk_count(),
        }
    }
}

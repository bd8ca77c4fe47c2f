//! Paged metadata relocation
//!
//! After a capacity change the paged metadata region is rebuilt at its new
//! location the same way it is at group creation:
//!
//! ```text
//! ZeroMetadata -> [ZeroJournal] -> WritePagedChunk(start) -> ... -> WritePagedChunk(end - CHUNK) -> Done
//! ```
//!
//! Every operation is addressed per disk, the same as verify I/O: the
//! zero and the first write-verify both start at `paged_disk_range().0`.
//!
//! The relocator never issues I/O itself. The caller takes
//! `next_operation()`, issues it, and feeds the completion to `resume()`.
//! Any failed completion fails the whole relocation; there is no retry here.

use super::errors::{RelocationError, RelocationResult};
use crate::geometry::{MetadataPositions, RaidType, CHUNK_SIZE, WRITE_LOG_BLOCKS_PER_DISK};
use crate::transport::{BlockCompletion, BlockOpcode, BlockOperation};

/// Where relocation writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationPlan {
    pub paged_metadata_lba: u64,
    pub paged_metadata_capacity: u64,
    pub journal_write_log_pba: u64,
    /// 0 when the raid type has no journal
    pub journal_blocks_per_disk: u64,
    pub data_disks: u32,
}

impl RelocationPlan {
    pub fn new(positions: &MetadataPositions, raid_type: RaidType, data_disks: u32) -> Self {
        Self {
            paged_metadata_lba: positions.paged_metadata_lba,
            paged_metadata_capacity: positions.paged_metadata_capacity,
            journal_write_log_pba: positions.journal_write_log_pba,
            journal_blocks_per_disk: if raid_type.has_write_log() {
                WRITE_LOG_BLOCKS_PER_DISK
            } else {
                0
            },
            data_disks,
        }
    }

    /// Per-disk range of paged metadata covered by the write-verify loop.
    pub fn paged_disk_range(&self) -> (u64, u64) {
        let disks = u64::from(self.data_disks.max(1));
        (
            self.paged_metadata_lba / disks,
            (self.paged_metadata_lba + self.paged_metadata_capacity) / disks,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationStep {
    ZeroMetadata,
    ZeroJournal,
    WritePagedChunk { lba: u64 },
    Done,
}

impl RelocationStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ZeroMetadata => "zero_metadata",
            Self::ZeroJournal => "zero_journal",
            Self::WritePagedChunk { .. } => "write_paged_chunk",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PagedMetadataRelocator {
    plan: RelocationPlan,
    step: RelocationStep,
    completed_ios: u64,
}

impl PagedMetadataRelocator {
    pub fn new(plan: RelocationPlan) -> Self {
        Self {
            plan,
            step: RelocationStep::ZeroMetadata,
            completed_ios: 0,
        }
    }

    pub fn plan(&self) -> &RelocationPlan {
        &self.plan
    }

    pub fn step(&self) -> RelocationStep {
        self.step
    }

    pub fn is_done(&self) -> bool {
        self.step == RelocationStep::Done
    }

    pub fn completed_ios(&self) -> u64 {
        self.completed_ios
    }

    /// The operation the current step needs, or `None` once done.
    pub fn next_operation(&self) -> Option<BlockOperation> {
        match self.step {
            RelocationStep::ZeroMetadata => {
                let (start, end) = self.plan.paged_disk_range();
                Some(BlockOperation::new(BlockOpcode::Zero, start, end - start))
            }
            RelocationStep::ZeroJournal => Some(BlockOperation::new(
                BlockOpcode::Zero,
                self.plan.journal_write_log_pba,
                self.plan.journal_blocks_per_disk,
            )),
            RelocationStep::WritePagedChunk { lba } => {
                let (_, end) = self.plan.paged_disk_range();
                Some(BlockOperation::new(
                    BlockOpcode::WriteVerify,
                    lba,
                    CHUNK_SIZE.min(end - lba),
                ))
            }
            RelocationStep::Done => None,
        }
    }

    /// Advance past the current step with its completion.
    pub fn resume(&mut self, completion: &BlockCompletion) -> RelocationResult<RelocationStep> {
        let failed_at = match self.step {
            RelocationStep::Done => return Err(RelocationError::AlreadyComplete),
            RelocationStep::ZeroMetadata => self.plan.paged_disk_range().0,
            RelocationStep::ZeroJournal => self.plan.journal_write_log_pba,
            RelocationStep::WritePagedChunk { lba } => lba,
        };
        if !completion.is_success() {
            return Err(RelocationError::IoFailed {
                step: self.step.name(),
                lba: failed_at,
            });
        }
        self.completed_ios += 1;

        self.step = match self.step {
            RelocationStep::ZeroMetadata if self.plan.journal_blocks_per_disk > 0 => {
                RelocationStep::ZeroJournal
            }
            RelocationStep::ZeroMetadata | RelocationStep::ZeroJournal => self.first_chunk(),
            RelocationStep::WritePagedChunk { lba } => {
                let (_, end) = self.plan.paged_disk_range();
                let next = lba + CHUNK_SIZE;
                if next < end {
                    RelocationStep::WritePagedChunk { lba: next }
                } else {
                    RelocationStep::Done
                }
            }
            RelocationStep::Done => RelocationStep::Done,
        };
        Ok(self.step)
    }

    fn first_chunk(&self) -> RelocationStep {
        let (start, end) = self.plan.paged_disk_range();
        if start < end {
            RelocationStep::WritePagedChunk { lba: start }
        } else {
            RelocationStep::Done
        }
    }
}

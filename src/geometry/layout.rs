//! Metadata position calculation
//!
//! Pure arithmetic. Given an exported capacity the layout of a raid group is:
//!
//! ```text
//! | exported user space | paged metadata | journal (parity only) |
//! 0                     paged_lba        raid_capacity           imported
//! ```
//!
//! Paged metadata and journal sizes are always whole chunk stripes so the
//! exported capacity stays chunk aligned.

use serde::Serialize;

use super::errors::{LayoutError, LayoutResult};
use super::raid::RaidType;
use super::{
    CHUNK_SIZE, METADATA_BLOCK_DATA_SIZE, PAGED_CHUNK_ENTRY_BYTES, PAGED_METADATA_COPIES,
    WRITE_LOG_BLOCKS_PER_DISK,
};

/// Round `requested` up to the next multiple of `CHUNK_SIZE * data_disks`.
pub fn round_capacity(requested: u64, data_disks: u32) -> LayoutResult<u64> {
    if data_disks == 0 {
        return Err(LayoutError::NoDataDisks);
    }
    let overflow = || LayoutError::Overflow {
        capacity: requested,
        data_disks,
    };
    let per_chunk_stripe = CHUNK_SIZE
        .checked_mul(u64::from(data_disks))
        .ok_or_else(overflow)?;
    let remainder = requested % per_chunk_stripe;
    if remainder == 0 {
        return Ok(requested);
    }
    requested
        .checked_add(per_chunk_stripe - remainder)
        .ok_or_else(overflow)
}

/// Layout derived for one exported capacity. Never persisted as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetadataPositions {
    /// Rounded exported capacity the layout was computed for
    pub exported_capacity: u64,
    /// First raid LBA of paged metadata
    pub paged_metadata_lba: u64,
    /// Paged metadata size in raid blocks, all copies included
    pub paged_metadata_capacity: u64,
    /// Per-disk start of the journal write log
    pub journal_write_log_pba: u64,
    /// Journal size in raid blocks (0 for non parity types)
    pub journal_capacity: u64,
    /// End of paged metadata; the last stripe-lockable raid LBA + 1
    pub raid_capacity: u64,
    /// Everything the group consumes from its disks
    pub imported_capacity: u64,
    pub imported_blocks_per_disk: u64,
}

/// Computes [`MetadataPositions`].
pub struct MetadataPositionCalculator;

impl MetadataPositionCalculator {
    pub fn compute(
        requested_capacity: u64,
        raid_type: RaidType,
        data_disks: u32,
    ) -> LayoutResult<MetadataPositions> {
        if raid_type == RaidType::Raid1 && data_disks != 1 {
            return Err(LayoutError::UnsupportedDataDisks {
                raid_type,
                data_disks,
            });
        }
        let exported = round_capacity(requested_capacity, data_disks)?;
        let overflow = || LayoutError::Overflow {
            capacity: requested_capacity,
            data_disks,
        };

        let disks = u64::from(data_disks);
        let per_chunk_stripe = CHUNK_SIZE * disks;
        let chunks = exported / per_chunk_stripe;

        let entries_per_block = METADATA_BLOCK_DATA_SIZE / PAGED_CHUNK_ENTRY_BYTES;
        let paged_blocks = round_capacity(chunks.div_ceil(entries_per_block), data_disks)?;
        let paged_metadata_capacity = paged_blocks
            .checked_mul(PAGED_METADATA_COPIES)
            .ok_or_else(overflow)?;

        let journal_capacity = if raid_type.has_write_log() {
            WRITE_LOG_BLOCKS_PER_DISK
                .checked_mul(disks)
                .ok_or_else(overflow)?
        } else {
            0
        };

        let raid_capacity = exported
            .checked_add(paged_metadata_capacity)
            .ok_or_else(overflow)?;
        let imported_capacity = raid_capacity
            .checked_add(journal_capacity)
            .ok_or_else(overflow)?;

        Ok(MetadataPositions {
            exported_capacity: exported,
            paged_metadata_lba: exported,
            paged_metadata_capacity,
            journal_write_log_pba: raid_capacity / disks,
            journal_capacity,
            raid_capacity,
            imported_capacity,
            imported_blocks_per_disk: imported_capacity / disks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_capacity_up() {
        // 4 data disks -> 8192 block chunk stripe
        assert_eq!(round_capacity(100001, 4).unwrap(), 106496);
        assert_eq!(round_capacity(8192, 4).unwrap(), 8192);
        assert_eq!(round_capacity(1, 4).unwrap(), 8192);
        assert_eq!(round_capacity(0, 4).unwrap(), 0);
    }

    #[test]
    fn test_round_capacity_no_data_disks() {
        assert_eq!(round_capacity(10, 0), Err(LayoutError::NoDataDisks));
    }

    #[test]
    fn test_round_capacity_overflow() {
        assert!(matches!(
            round_capacity(u64::MAX - 1, 4),
            Err(LayoutError::Overflow { .. })
        ));
    }

    #[test]
    fn test_compute_parity_layout() {
        let positions = MetadataPositionCalculator::compute(8192 * 10, RaidType::Raid5, 4).unwrap();

        assert_eq!(positions.exported_capacity, 81920);
        assert_eq!(positions.paged_metadata_lba, 81920);
        // 10 chunks fit in one metadata block, rounded to a chunk stripe
        assert_eq!(positions.paged_metadata_capacity, 8192);
        assert_eq!(positions.raid_capacity, 90112);
        assert_eq!(positions.journal_capacity, WRITE_LOG_BLOCKS_PER_DISK * 4);
        assert_eq!(positions.journal_write_log_pba, 90112 / 4);
        assert_eq!(
            positions.imported_capacity,
            90112 + WRITE_LOG_BLOCKS_PER_DISK * 4
        );
    }

    #[test]
    fn test_compute_mirror_has_no_journal() {
        let positions = MetadataPositionCalculator::compute(4096, RaidType::Raid1, 1).unwrap();
        assert_eq!(positions.journal_capacity, 0);
        assert_eq!(positions.imported_capacity, positions.raid_capacity);
    }

    #[test]
    fn test_compute_rejects_wide_mirror() {
        let err = MetadataPositionCalculator::compute(4096, RaidType::Raid1, 2).unwrap_err();
        assert!(matches!(err, LayoutError::UnsupportedDataDisks { .. }));
    }

    #[test]
    fn test_compute_is_deterministic() {
        let a = MetadataPositionCalculator::compute(123_456_789, RaidType::Raid6, 6).unwrap();
        let b = MetadataPositionCalculator::compute(123_456_789, RaidType::Raid6, 6).unwrap();
        assert_eq!(a, b);
    }
}

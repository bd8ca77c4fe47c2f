//! Raid group geometry and metadata layout
//!
//! - `RaidType` / `RaidGeometry`: disks, elements, stripes
//! - `MetadataPositionCalculator`: where paged metadata and the journal live
//!   for a given exported capacity
//!
//! Everything here is pure and safe to call from any thread.

mod errors;
mod layout;
mod raid;

pub use errors::{GeometryConfigError, LayoutError, LayoutResult};
pub use layout::{round_capacity, MetadataPositionCalculator, MetadataPositions};
pub use raid::{LockRange, RaidGeometry, RaidType};

/// Unit of bitmap marking and checkpoint granularity, in blocks per disk.
pub const CHUNK_SIZE: u64 = 2048;

/// Write log (journal) size on each disk of a parity group.
pub const WRITE_LOG_BLOCKS_PER_DISK: u64 = 32 * CHUNK_SIZE;

/// Usable bytes in one metadata block.
pub const METADATA_BLOCK_DATA_SIZE: u64 = 512;

/// Bytes of paged metadata per chunk.
pub const PAGED_CHUNK_ENTRY_BYTES: u64 = 4;

pub const PAGED_METADATA_COPIES: u64 = 1;

/// Checkpoint / LBA sentinel meaning "nothing outstanding".
pub const INVALID_LBA: u64 = u64::MAX;

//! Geometry and layout error types

use thiserror::Error;

use super::raid::RaidType;

/// Result type for layout calculations
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Raised when a capacity cannot be turned into a metadata layout.
///
/// Fatal to the single `compute` call. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("data disk count must be non-zero")]
    NoDataDisks,

    #[error("{raid_type} cannot be laid out across {data_disks} data disks")]
    UnsupportedDataDisks { raid_type: RaidType, data_disks: u32 },

    #[error("layout of {capacity} blocks across {data_disks} data disks overflows")]
    Overflow { capacity: u64, data_disks: u32 },
}

/// Raised when the raid geometry rejects a reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryConfigError {
    #[error("width {width} is not valid for {raid_type}")]
    InvalidWidth { raid_type: RaidType, width: u32 },

    #[error("element size must be non-zero")]
    ZeroElementSize,

    #[error("elements per parity must be non-zero for {0}")]
    ZeroElementsPerParity(RaidType),

    #[error("capacity {capacity} does not divide across {data_disks} data disks")]
    UnalignedCapacity { capacity: u64, data_disks: u32 },
}

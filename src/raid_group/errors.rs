//! Raid group errors

use thiserror::Error;

use crate::geometry::{GeometryConfigError, LayoutError};

pub type CapacityResult<T> = Result<T, CapacityError>;
pub type RelocationResult<T> = Result<T, RelocationError>;

/// Failure to apply a capacity to the group.
///
/// Geometry may be partially updated when this is returned; the caller
/// restores it by applying the previous capacity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("geometry: {0}")]
    Geometry(#[from] GeometryConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelocationError {
    #[error("{step} I/O failed at lba {lba}")]
    IoFailed { step: &'static str, lba: u64 },

    #[error("relocation already complete")]
    AlreadyComplete,
}

//! Verify errors

use thiserror::Error;

use super::VerifyKind;
use crate::metadata::MetadataError;

pub type VerifyResult<T> = Result<T, VerifyError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The advance does not start where the checkpoint is.
    #[error("{kind:?} checkpoint is at {checkpoint}, advance starts at {start}")]
    CheckpointMismatch {
        kind: VerifyKind,
        checkpoint: u64,
        start: u64,
    },

    #[error("{kind:?} advance at {start} covers no blocks")]
    NoProgress { kind: VerifyKind, start: u64 },

    #[error("{0:?} verify cannot be restarted")]
    RestartNotSupported(VerifyKind),

    #[error("range {lba}+{blocks} is outside the verifiable area ending at {end}")]
    OutOfRange { lba: u64, blocks: u64, end: u64 },

    #[error("metadata: {0}")]
    Metadata(#[from] MetadataError),
}

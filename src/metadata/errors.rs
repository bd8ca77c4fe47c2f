//! Metadata store errors

use thiserror::Error;

pub type MetadataResult<T> = Result<T, MetadataError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("chunk range {first}..{end} is outside the {chunks} paged chunks")]
    ChunkOutOfRange { first: u64, end: u64, chunks: u64 },

    #[error("non-paged metadata has not been persisted")]
    NotPersisted,

    #[error("non-paged record is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("non-paged record checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("non-paged record encoding failed: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for MetadataError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

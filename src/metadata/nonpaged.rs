//! Non-paged metadata record
//!
//! On-disk record layout:
//!
//! ```text
//! | crc32 (u32 LE) | body length (u32 LE) | JSON body |
//! ```
//!
//! The checksum covers the body only.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use super::errors::{MetadataError, MetadataResult};
use crate::geometry::INVALID_LBA;
use crate::verify::{VerifyCheckpoints, VerifyKind};

/// Slots of "metadata of metadata" verify bits, one per paged-metadata chunk.
pub const MAX_MDD_SLOTS: usize = 14;

const RECORD_HEADER_LEN: usize = 8;

/// Non-paged metadata of one raid group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonPagedMetadata {
    pub verify_checkpoints: VerifyCheckpoints,

    /// Verify bits for the paged metadata chunks themselves
    pub mdd_verify_bits: Vec<u8>,

    /// Kinds that must run another pass once the current one completes
    pub verify_required: u8,

    /// Per-position rebuild checkpoint (disk LBA), `INVALID_LBA` when not rebuilding
    pub rebuild_checkpoints: Vec<u64>,
}

impl NonPagedMetadata {
    pub fn new(width: u32) -> Self {
        Self {
            verify_checkpoints: VerifyCheckpoints::default(),
            mdd_verify_bits: vec![0; MAX_MDD_SLOTS],
            verify_required: 0,
            rebuild_checkpoints: vec![INVALID_LBA; width as usize],
        }
    }

    /// Whether any MDD slot still has `kind` pending.
    pub fn mdd_pending(&self, kind: VerifyKind) -> bool {
        self.mdd_verify_bits.iter().any(|bits| bits & kind.flag() != 0)
    }

    pub fn is_verify_required(&self, kind: VerifyKind) -> bool {
        self.verify_required & kind.flag() != 0
    }

    /// Encode into a checksummed record.
    pub fn encode(&self) -> MetadataResult<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        let len = u32::try_from(body.len())
            .map_err(|_| MetadataError::Encoding(format!("body of {} bytes", body.len())))?;

        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + body.len());
        record.extend_from_slice(&checksum(&body).to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(&body);
        Ok(record)
    }

    /// Decode and validate a checksummed record.
    pub fn decode(record: &[u8]) -> MetadataResult<Self> {
        if record.len() < RECORD_HEADER_LEN {
            return Err(MetadataError::Truncated(record.len()));
        }
        let stored = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let len = u32::from_le_bytes([record[4], record[5], record[6], record[7]]) as usize;
        let body = record
            .get(RECORD_HEADER_LEN..RECORD_HEADER_LEN + len)
            .ok_or(MetadataError::Truncated(record.len()))?;

        let computed = checksum(body);
        if computed != stored {
            return Err(MetadataError::ChecksumMismatch { stored, computed });
        }
        Ok(serde_json::from_slice(body)?)
    }
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_nothing_outstanding() {
        let md = NonPagedMetadata::new(5);
        assert_eq!(md.rebuild_checkpoints, vec![INVALID_LBA; 5]);
        assert_eq!(md.mdd_verify_bits.len(), MAX_MDD_SLOTS);
        for kind in VerifyKind::PRIORITY {
            assert!(!md.mdd_pending(kind));
            assert!(!md.is_verify_required(kind));
        }
    }

    #[test]
    fn test_record_detects_corruption() {
        let mut md = NonPagedMetadata::new(3);
        md.verify_checkpoints.set(VerifyKind::ReadWrite, 4096);
        let mut record = md.encode().unwrap();

        let last = record.len() - 2;
        record[last] ^= 0x01;
        assert!(matches!(
            NonPagedMetadata::decode(&record),
            Err(MetadataError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_record_truncated() {
        let md = NonPagedMetadata::new(3);
        let record = md.encode().unwrap();
        assert!(matches!(
            NonPagedMetadata::decode(&record[..record.len() - 1]),
            Err(MetadataError::Truncated(_))
        ));
        assert!(matches!(
            NonPagedMetadata::decode(&record[..4]),
            Err(MetadataError::Truncated(4))
        ));
    }

    #[test]
    fn test_record_decodes_what_was_written() {
        let mut md = NonPagedMetadata::new(4);
        md.verify_checkpoints.set(VerifyKind::Error, 0);
        md.verify_required = VerifyKind::Error.flag();
        md.rebuild_checkpoints[2] = 777;

        let decoded = NonPagedMetadata::decode(&md.encode().unwrap()).unwrap();
        assert_eq!(decoded, md);
    }
}

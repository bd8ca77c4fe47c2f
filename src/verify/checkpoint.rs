//! Verify kinds and their persistent checkpoints

use serde::{Deserialize, Serialize};

use crate::geometry::INVALID_LBA;
use crate::transport::BlockOpcode;

/// Background verify kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyKind {
    IncompleteWrite,
    Error,
    System,
    ReadWrite,
    ReadOnly,
}

impl VerifyKind {
    /// Highest priority first. Medic-action reporting uses the same order.
    pub const PRIORITY: [VerifyKind; 5] = [
        VerifyKind::IncompleteWrite,
        VerifyKind::Error,
        VerifyKind::System,
        VerifyKind::ReadWrite,
        VerifyKind::ReadOnly,
    ];

    /// Bit used for this kind in chunk and MDD bitmaps.
    pub fn flag(&self) -> u8 {
        match self {
            Self::Error => 0x01,
            Self::ReadWrite => 0x02,
            Self::ReadOnly => 0x04,
            Self::IncompleteWrite => 0x08,
            Self::System => 0x10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncompleteWrite => "incomplete_write",
            Self::Error => "error",
            Self::System => "system",
            Self::ReadWrite => "read_write",
            Self::ReadOnly => "read_only",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn opcode(&self) -> BlockOpcode {
        match self {
            Self::IncompleteWrite => BlockOpcode::InitiateIncompleteWriteVerify,
            Self::Error => BlockOpcode::InitiateErrorVerify,
            Self::System => BlockOpcode::InitiateSystemVerify,
            Self::ReadWrite => BlockOpcode::InitiateUserVerify,
            Self::ReadOnly => BlockOpcode::InitiateReadOnlyVerify,
        }
    }

    /// Mask with every kind set.
    pub fn all_flags() -> u8 {
        Self::PRIORITY.iter().fold(0, |mask, kind| mask | kind.flag())
    }
}

/// One disk-relative checkpoint per verify kind.
///
/// `INVALID_LBA` means no verify of that kind is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCheckpoints {
    pub incomplete_write: u64,
    pub error: u64,
    pub system: u64,
    pub read_write: u64,
    pub read_only: u64,
}

impl Default for VerifyCheckpoints {
    fn default() -> Self {
        Self {
            incomplete_write: INVALID_LBA,
            error: INVALID_LBA,
            system: INVALID_LBA,
            read_write: INVALID_LBA,
            read_only: INVALID_LBA,
        }
    }
}

impl VerifyCheckpoints {
    pub fn get(&self, kind: VerifyKind) -> u64 {
        match kind {
            VerifyKind::IncompleteWrite => self.incomplete_write,
            VerifyKind::Error => self.error,
            VerifyKind::System => self.system,
            VerifyKind::ReadWrite => self.read_write,
            VerifyKind::ReadOnly => self.read_only,
        }
    }

    pub fn set(&mut self, kind: VerifyKind, lba: u64) {
        let slot = match kind {
            VerifyKind::IncompleteWrite => &mut self.incomplete_write,
            VerifyKind::Error => &mut self.error,
            VerifyKind::System => &mut self.system,
            VerifyKind::ReadWrite => &mut self.read_write,
            VerifyKind::ReadOnly => &mut self.read_only,
        };
        *slot = lba;
    }

    /// Checkpoint of the highest priority kind in `kinds_mask` that is outstanding.
    pub fn highest_priority(&self, kinds_mask: u8) -> Option<(VerifyKind, u64)> {
        VerifyKind::PRIORITY
            .into_iter()
            .filter(|kind| kinds_mask & kind.flag() != 0)
            .map(|kind| (kind, self.get(kind)))
            .find(|(_, lba)| *lba != INVALID_LBA)
    }
}

//! Block I/O transport seam
//!
//! The physical I/O path is external. The protocol only issues block
//! operations and consumes their completion.

use std::fmt;

/// Block operations issued by relocation and verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockOpcode {
    /// Zero a range (paged metadata, journal)
    Zero,
    /// Write and verify one paged metadata chunk
    WriteVerify,
    InitiateErrorVerify,
    InitiateIncompleteWriteVerify,
    InitiateSystemVerify,
    /// Read-write (user) verify
    InitiateUserVerify,
    InitiateReadOnlyVerify,
}

impl BlockOpcode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::WriteVerify => "write_verify",
            Self::InitiateErrorVerify => "error_verify",
            Self::InitiateIncompleteWriteVerify => "incomplete_write_verify",
            Self::InitiateSystemVerify => "system_verify",
            Self::InitiateUserVerify => "user_verify",
            Self::InitiateReadOnlyVerify => "read_only_verify",
        }
    }
}

impl fmt::Display for BlockOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One block operation.
///
/// `lba` and `block_count` are disk-relative for every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOperation {
    pub opcode: BlockOpcode,
    pub lba: u64,
    pub block_count: u64,
}

impl BlockOperation {
    pub fn new(opcode: BlockOpcode, lba: u64, block_count: u64) -> Self {
        Self {
            opcode,
            lba,
            block_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Success,
    Failed,
}

/// Completion of a block operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCompletion {
    pub status: BlockStatus,
    /// Errors the verify found and fixed
    pub correctable_errors: u32,
    /// Errors the verify could not fix
    pub uncorrectable_errors: u32,
}

impl BlockCompletion {
    pub fn success() -> Self {
        Self {
            status: BlockStatus::Success,
            correctable_errors: 0,
            uncorrectable_errors: 0,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: BlockStatus::Failed,
            ..Self::success()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BlockStatus::Success
    }

    pub fn has_errors(&self) -> bool {
        self.correctable_errors > 0 || self.uncorrectable_errors > 0
    }
}

/// Issues block operations on behalf of a raid group.
pub trait BlockTransport {
    fn issue_block_op(&mut self, op: &BlockOperation) -> BlockCompletion;
}

/// Deterministic transport used by the simulator and tests.
///
/// Records every operation. Operations can be failed by opcode and LBA,
/// and verify operations can be made to report media errors.
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    issued: Vec<BlockOperation>,
    failures: Vec<(BlockOpcode, Option<u64>)>,
    media_errors: Vec<(u64, u32, u32)>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `opcode` op, or only the one starting at `lba`.
    pub fn fail(&mut self, opcode: BlockOpcode, lba: Option<u64>) {
        self.failures.push((opcode, lba));
    }

    /// Report errors on any verify op covering `lba`.
    pub fn media_error(&mut self, lba: u64, correctable: u32, uncorrectable: u32) {
        self.media_errors.push((lba, correctable, uncorrectable));
    }

    pub fn issued(&self) -> &[BlockOperation] {
        &self.issued
    }

    pub fn issued_with(&self, opcode: BlockOpcode) -> Vec<BlockOperation> {
        self.issued
            .iter()
            .filter(|op| op.opcode == opcode)
            .copied()
            .collect()
    }
}

impl BlockTransport for SimulatedTransport {
    fn issue_block_op(&mut self, op: &BlockOperation) -> BlockCompletion {
        self.issued.push(*op);

        let fails = self
            .failures
            .iter()
            .any(|(opcode, lba)| *opcode == op.opcode && lba.map_or(true, |lba| lba == op.lba));
        if fails {
            return BlockCompletion::failed();
        }

        let mut completion = BlockCompletion::success();
        for (lba, correctable, uncorrectable) in &self.media_errors {
            if *lba >= op.lba && *lba < op.lba + op.block_count {
                completion.correctable_errors += correctable;
                completion.uncorrectable_errors += uncorrectable;
            }
        }
        completion
    }
}

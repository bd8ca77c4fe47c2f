//! Background verify
//!
//! - `VerifyKind` / `VerifyCheckpoints`: the five kinds and their persisted checkpoints
//! - `VerifyCheckpointEngine`: marking, scheduling and checkpoint advance
//! - `UpstreamEvents`: permit requests and verify reports to the object above

mod checkpoint;
mod engine;
mod errors;
mod upstream;

pub use checkpoint::{VerifyCheckpoints, VerifyKind};
pub use engine::{
    CycleOutcome, VerifyCheckpointEngine, VerifyRegion, VerifySettings, DEFAULT_CHUNKS_PER_CYCLE,
    DEFAULT_PERSIST_INTERVAL_MS,
};
pub use errors::{VerifyError, VerifyResult};
pub use upstream::{
    ExtentUpstream, PermitRequest, PermitResponse, PermitStatus, UpstreamError, UpstreamEvents,
    VerifyReport,
};

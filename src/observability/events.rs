//! Observable events
//!
//! Every protocol milestone has one typed event. The severity of each event
//! is fixed here so call sites never pick one.

use std::fmt;

use super::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Startup
    ConfigLoaded,
    GroupCreated,

    // Capacity change requests
    CapacityChangeRequested,
    /// Requested capacity rounds to the current one
    CapacityChangeNoop,
    CapacityChangeRejected,
    /// Peer started an episode this SP joins
    ConfigChangeJoined,

    // Episode progress
    ConfigChangePhase,
    MonitorHookFired,
    CapacityApplied,
    CapacityApplyFailed,
    CapacityReverted,
    ConfigChangeComplete,
    ConfigChangeFailed,

    // Drain
    QuiesceHold,
    QuiesceComplete,
    QuiesceReleased,
    QuiesceNotSet,

    // Paged metadata relocation
    RelocationStart,
    RelocationComplete,
    RelocationFailed,

    // Peer
    PeerContactLost,
    PeerDiedCleanup,

    // Verify
    VerifyMarked,
    VerifyIoComplete,
    VerifyRangeSkipped,
    VerifyPermitBusy,
    VerifyIoFailed,
    VerifyPassComplete,
    VerifyReportSent,
    VerifyReportDeferred,
    CheckpointPersisted,
    CheckpointPersistFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::GroupCreated => "RAID_GROUP_CREATED",

            Event::CapacityChangeRequested => "CAPACITY_CHANGE_REQUESTED",
            Event::CapacityChangeNoop => "CAPACITY_CHANGE_NOOP",
            Event::CapacityChangeRejected => "CAPACITY_CHANGE_REJECTED",
            Event::ConfigChangeJoined => "CONFIG_CHANGE_JOINED",

            Event::ConfigChangePhase => "CONFIG_CHANGE_PHASE",
            Event::MonitorHookFired => "MONITOR_HOOK_FIRED",
            Event::CapacityApplied => "CAPACITY_APPLIED",
            Event::CapacityApplyFailed => "CAPACITY_APPLY_FAILED",
            Event::CapacityReverted => "CAPACITY_REVERTED",
            Event::ConfigChangeComplete => "CONFIG_CHANGE_COMPLETE",
            Event::ConfigChangeFailed => "CONFIG_CHANGE_FAILED",

            Event::QuiesceHold => "QUIESCE_HOLD",
            Event::QuiesceComplete => "QUIESCE_COMPLETE",
            Event::QuiesceReleased => "QUIESCE_RELEASED",
            Event::QuiesceNotSet => "QUIESCE_NOT_SET",

            Event::RelocationStart => "PAGED_RELOCATION_BEGIN",
            Event::RelocationComplete => "PAGED_RELOCATION_COMPLETE",
            Event::RelocationFailed => "PAGED_RELOCATION_FAILED",

            Event::PeerContactLost => "PEER_CONTACT_LOST",
            Event::PeerDiedCleanup => "PEER_DIED_CLEANUP",

            Event::VerifyMarked => "VERIFY_MARKED",
            Event::VerifyIoComplete => "VERIFY_IO_COMPLETE",
            Event::VerifyRangeSkipped => "VERIFY_RANGE_SKIPPED",
            Event::VerifyPermitBusy => "VERIFY_PERMIT_BUSY",
            Event::VerifyIoFailed => "VERIFY_IO_FAILED",
            Event::VerifyPassComplete => "VERIFY_PASS_COMPLETE",
            Event::VerifyReportSent => "VERIFY_REPORT_SENT",
            Event::VerifyReportDeferred => "VERIFY_REPORT_DEFERRED",
            Event::CheckpointPersisted => "CHECKPOINT_PERSISTED",
            Event::CheckpointPersistFailed => "CHECKPOINT_PERSIST_FAILED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::VerifyIoComplete
            | Event::VerifyRangeSkipped
            | Event::VerifyPermitBusy
            | Event::CheckpointPersisted
            | Event::MonitorHookFired => Severity::Trace,

            Event::CapacityChangeRejected
            | Event::CapacityApplyFailed
            | Event::CapacityReverted
            | Event::ConfigChangeFailed
            | Event::QuiesceNotSet
            | Event::RelocationFailed
            | Event::PeerContactLost
            | Event::VerifyIoFailed
            | Event::VerifyReportDeferred => Severity::Warn,

            Event::CheckpointPersistFailed => Severity::Error,

            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

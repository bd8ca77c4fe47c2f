//! Upstream event channel
//!
//! Verify asks the object above the raid group whether a range holds user
//! data before verifying it, and reports verify results back up. Both
//! sides speak raid (host) LBAs; the engine converts to disk LBAs.

use std::ops::Range;

use thiserror::Error;

use super::VerifyKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermitStatus {
    Ok,
    /// Nothing in the range is consumed
    NoUserData,
    Busy,
    /// A client refused the request
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitRequest {
    pub kind: VerifyKind,
    pub lba: u64,
    pub block_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitResponse {
    pub status: PermitStatus,
    pub unconsumed_block_count: u64,
    /// The unconsumed blocks lead the range rather than trail it
    pub unconsumed_at_start: bool,
    /// End of the extent holding the consumed part of the range
    pub extent_end: Option<u64>,
}

impl PermitResponse {
    pub fn status(status: PermitStatus) -> Self {
        Self {
            status,
            unconsumed_block_count: 0,
            unconsumed_at_start: false,
            extent_end: None,
        }
    }
}

/// Sent at the end of an extent, or whenever a verify found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyReport {
    pub kind: VerifyKind,
    pub lba: u64,
    pub block_count: u64,
    pub correctable_errors: u32,
    pub uncorrectable_errors: u32,
    pub end_of_extent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("insufficient resources to send {0}")]
    InsufficientResources(&'static str),
}

pub trait UpstreamEvents {
    fn request_permit(&mut self, request: &PermitRequest) -> PermitResponse;

    fn send_verify_report(&mut self, report: &VerifyReport) -> Result<(), UpstreamError>;
}

/// Upstream made of consumed extents, for the simulator and tests.
#[derive(Debug, Default)]
pub struct ExtentUpstream {
    extents: Vec<Range<u64>>,
    busy: bool,
    deny: bool,
    report_failures: u32,
    reports: Vec<VerifyReport>,
    permits: Vec<PermitRequest>,
}

impl ExtentUpstream {
    /// Every LBA is consumed.
    pub fn fully_consumed() -> Self {
        Self::with_extents(vec![0..u64::MAX])
    }

    pub fn with_extents(mut extents: Vec<Range<u64>>) -> Self {
        extents.sort_by_key(|extent| extent.start);
        Self {
            extents,
            ..Self::default()
        }
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn set_deny(&mut self, deny: bool) {
        self.deny = deny;
    }

    /// Fail the next `count` report sends.
    pub fn fail_reports(&mut self, count: u32) {
        self.report_failures = count;
    }

    pub fn reports(&self) -> &[VerifyReport] {
        &self.reports
    }

    pub fn permits(&self) -> &[PermitRequest] {
        &self.permits
    }
}

impl UpstreamEvents for ExtentUpstream {
    fn request_permit(&mut self, request: &PermitRequest) -> PermitResponse {
        self.permits.push(*request);
        if self.busy {
            return PermitResponse::status(PermitStatus::Busy);
        }
        if self.deny {
            return PermitResponse::status(PermitStatus::Deny);
        }

        let start = request.lba;
        let end = start.saturating_add(request.block_count);
        let Some(extent) = self
            .extents
            .iter()
            .find(|extent| extent.end > start && extent.start < end)
        else {
            return PermitResponse {
                unconsumed_block_count: request.block_count,
                ..PermitResponse::status(PermitStatus::NoUserData)
            };
        };

        if extent.start > start {
            PermitResponse {
                status: PermitStatus::Ok,
                unconsumed_block_count: extent.start - start,
                unconsumed_at_start: true,
                extent_end: Some(extent.end),
            }
        } else {
            PermitResponse {
                status: PermitStatus::Ok,
                unconsumed_block_count: end.saturating_sub(extent.end),
                unconsumed_at_start: false,
                extent_end: Some(extent.end),
            }
        }
    }

    fn send_verify_report(&mut self, report: &VerifyReport) -> Result<(), UpstreamError> {
        if self.report_failures > 0 {
            self.report_failures -= 1;
            return Err(UpstreamError::InsufficientResources("verify report"));
        }
        self.reports.push(*report);
        Ok(())
    }
}

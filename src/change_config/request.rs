//! Capacity change requests
//!
//! A request is admitted, queued on the usurper queue and completed
//! exactly once, when the episode it started reaches `Done`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// An administrative "change capacity" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityChangeRequest {
    pub id: Uuid,
    /// Requested exported capacity in blocks, before rounding
    pub capacity: u64,
}

impl CapacityChangeRequest {
    pub fn new(capacity: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            capacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Ok,
    Failed,
}

/// Final status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequestCompletion {
    pub id: Uuid,
    pub status: RequestStatus,
    /// Rounded capacity the request asked for
    pub target_capacity: u64,
    /// Exported capacity when the request completed
    pub exported_capacity: u64,
}

impl RequestCompletion {
    pub fn is_ok(&self) -> bool {
        self.status == RequestStatus::Ok
    }
}

/// What happened to a request on submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAdmission {
    /// Nothing to change; completed on the spot
    Completed(RequestCompletion),

    /// Queued; completes when the episode ends
    Queued { id: Uuid, target_capacity: u64 },

    /// An episode is already running
    AlreadyInProgress { id: Uuid },

    Rejected { id: Uuid, reason: &'static str },
}

impl RequestAdmission {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

/// The request held while its episode runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingRequest {
    pub request: CapacityChangeRequest,
    pub target_capacity: u64,
    pub received_at: DateTime<Utc>,
}

impl PendingRequest {
    pub fn new(request: CapacityChangeRequest, target_capacity: u64) -> Self {
        Self {
            request,
            target_capacity,
            received_at: Utc::now(),
        }
    }

    pub fn complete(&self, status: RequestStatus, exported_capacity: u64) -> RequestCompletion {
        RequestCompletion {
            id: self.request.id,
            status,
            target_capacity: self.target_capacity,
            exported_capacity,
        }
    }

    /// Milliseconds since the request was queued.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.received_at).num_milliseconds()
    }
}

//! Online capacity change
//!
//! - `ConfigChangeState`: the per-controller episode state machine
//! - `ConfigChangeCoordinator`: drives an episode with the peer through cluster memory
//! - `QuiesceDrain`: quiesce hold and drain before geometry changes
//! - Requests are held on the usurper queue until their episode is `Done`

mod coordinator;
mod drain;
mod errors;
mod request;
mod state;

pub use coordinator::{ConfigChangeCoordinator, ControllerRole};
pub use drain::{DrainStatus, QuiesceDrain};
pub use errors::{ConfigChangeError, ConfigChangeErrorKind, ConfigChangeResult};
pub use request::{CapacityChangeRequest, RequestAdmission, RequestCompletion, RequestStatus};
pub use state::{ConfigChangeOutcome, ConfigChangeState};

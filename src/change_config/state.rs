//! Configuration change state machine
//!
//! ```text
//! Idle -> Request -> Started -> Done(outcome) -> Idle
//!           |                      |
//!           +-> Idle (abandoned)   +-> Request (peer asked again)
//! ```
//!
//! Transitions consume the state and return the next one. Anything not
//! drawn above is a forbidden transition and an error, never a panic.

use super::errors::{ConfigChangeError, ConfigChangeResult};

/// How an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChangeOutcome {
    Success,
    /// Capacity is rolled back on both sides
    Error,
}

impl ConfigChangeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigChangeState {
    #[default]
    Idle,
    /// Waiting for both sides to show `CHANGE_CONFIG_REQ`
    Request,
    /// Quiesce, apply, relocate
    Started,
    /// Cleaning up flags and completing the request
    Done(ConfigChangeOutcome),
}

impl ConfigChangeState {
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Request => "Request",
            Self::Started => "Started",
            Self::Done(ConfigChangeOutcome::Success) => "Done(Success)",
            Self::Done(ConfigChangeOutcome::Error) => "Done(Error)",
        }
    }

    pub fn is_in_progress(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn outcome(&self) -> Option<ConfigChangeOutcome> {
        match self {
            Self::Done(outcome) => Some(*outcome),
            _ => None,
        }
    }

    // ===== Transitions =====

    /// Idle -> Request
    pub fn begin_request(self) -> ConfigChangeResult<Self> {
        match self {
            Self::Idle => Ok(Self::Request),
            _ => Err(ConfigChangeError::forbidden_transition(
                self.state_name(),
                "Request",
            )),
        }
    }

    /// Request -> Idle, when the peer dropped the request before it started.
    pub fn abandon(self) -> ConfigChangeResult<Self> {
        match self {
            Self::Request => Ok(Self::Idle),
            _ => Err(ConfigChangeError::forbidden_transition(
                self.state_name(),
                "Idle",
            )),
        }
    }

    /// Request -> Started
    pub fn start(self) -> ConfigChangeResult<Self> {
        match self {
            Self::Request => Ok(Self::Started),
            _ => Err(ConfigChangeError::forbidden_transition(
                self.state_name(),
                "Started",
            )),
        }
    }

    /// Request | Started -> Done, or Done(Success) -> Done(Error).
    pub fn finish(self, outcome: ConfigChangeOutcome) -> ConfigChangeResult<Self> {
        match (self, outcome) {
            (Self::Request | Self::Started, _) => Ok(Self::Done(outcome)),
            (Self::Done(_), ConfigChangeOutcome::Error) => Ok(Self::Done(outcome)),
            _ => Err(ConfigChangeError::forbidden_transition(
                self.state_name(),
                Self::Done(outcome).state_name(),
            )),
        }
    }

    /// Done -> Idle
    pub fn complete(self) -> ConfigChangeResult<Self> {
        match self {
            Self::Done(_) => Ok(Self::Idle),
            _ => Err(ConfigChangeError::forbidden_transition(
                self.state_name(),
                "Idle",
            )),
        }
    }

    /// Done -> Request, for a request that arrived while finishing.
    pub fn rerequest(self) -> ConfigChangeResult<Self> {
        match self {
            Self::Done(_) => Ok(Self::Request),
            _ => Err(ConfigChangeError::forbidden_transition(
                self.state_name(),
                "Request",
            )),
        }
    }
}

//! Configuration change errors
//!
//! Errors here are about driving the state machine. Failures of the
//! capacity change itself are not errors: they end the episode in
//! `Done(Error)` and roll back.

use std::fmt;

use crate::lifecycle::LifecycleError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeError {
    pub kind: ConfigChangeErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChangeErrorKind {
    /// Forbidden state transition attempted
    ForbiddenTransition,

    /// The lifecycle service refused a request
    Lifecycle,
}

impl ConfigChangeError {
    pub fn new(kind: ConfigChangeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn forbidden_transition(from: &str, to: &str) -> Self {
        Self::new(
            ConfigChangeErrorKind::ForbiddenTransition,
            format!("forbidden transition: {} -> {}", from, to),
        )
    }
}

impl From<LifecycleError> for ConfigChangeError {
    fn from(e: LifecycleError) -> Self {
        Self::new(ConfigChangeErrorKind::Lifecycle, e.to_string())
    }
}

impl fmt::Display for ConfigChangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigChangeError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ConfigChangeError {}

pub type ConfigChangeResult<T> = Result<T, ConfigChangeError>;

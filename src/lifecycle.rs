//! Lifecycle / scheduler seam
//!
//! The object lifecycle framework is external. Monitor code never blocks:
//! it sets conditions, asks to be rescheduled, or clears the condition it
//! is running under.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// Monitor conditions, in the order the scheduler runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Condition {
    Quiesce,
    ConfigurationChange,
    Unquiesce,
    Verify,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quiesce => "quiesce",
            Self::ConfigurationChange => "configuration_change",
            Self::Unquiesce => "unquiesce",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a condition handler tells the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    /// Nothing more to do until something changes
    Done,
    /// Run again soon
    Reschedule,
    /// Waiting on another condition or an I/O
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("no condition is currently running")]
    NoCurrentCondition,
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

pub trait Lifecycle {
    fn set_condition(&mut self, condition: Condition) -> LifecycleResult<()>;
    fn reschedule(&mut self, delay_ms: u64) -> LifecycleResult<()>;
    fn clear_current_condition(&mut self) -> LifecycleResult<()>;
}

/// In-memory condition set driven by [`crate::controller::Controller`].
#[derive(Debug, Default)]
pub struct ConditionSet {
    set: BTreeSet<Condition>,
    current: Option<Condition>,
    reschedule_ms: Option<u64>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self, condition: Condition) -> bool {
        self.set.contains(&condition)
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn conditions(&self) -> Vec<Condition> {
        self.set.iter().copied().collect()
    }

    /// Mark `condition` as the one being run.
    pub fn begin(&mut self, condition: Condition) {
        self.current = Some(condition);
    }

    pub fn end(&mut self) {
        self.current = None;
    }

    /// Delay of the last reschedule request, consumed by the caller.
    pub fn take_reschedule(&mut self) -> Option<u64> {
        self.reschedule_ms.take()
    }

    /// Remove a condition outside of its own handler.
    pub fn clear(&mut self, condition: Condition) {
        self.set.remove(&condition);
    }
}

impl Lifecycle for ConditionSet {
    fn set_condition(&mut self, condition: Condition) -> LifecycleResult<()> {
        self.set.insert(condition);
        Ok(())
    }

    fn reschedule(&mut self, delay_ms: u64) -> LifecycleResult<()> {
        self.reschedule_ms = Some(self.reschedule_ms.map_or(delay_ms, |d| d.min(delay_ms)));
        Ok(())
    }

    fn clear_current_condition(&mut self) -> LifecycleResult<()> {
        let current = self.current.ok_or(LifecycleError::NoCurrentCondition)?;
        self.set.remove(&current);
        Ok(())
    }
}

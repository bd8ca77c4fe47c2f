//! Monitor hooks for the configuration change protocol
//!
//! The coordinator consults a [`MonitorHooks`] implementation at each
//! named check-point. Production wiring uses [`NoHooks`]; tests arm
//! [`ScriptedHooks`] to pause the state machine or force an error outcome
//! at a chosen point.
//!
//! # Usage
//!
//! ```ignore
//! use raidgroup::hooks::{HookAction, HookPoint, ScriptedHooks};
//!
//! let hooks = ScriptedHooks::new();
//! hooks.arm(HookPoint::ErrorActive, HookAction::Fail);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Named check-points of the configuration change monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Request phase, after the local request flag is published
    Request,
    /// Started phase, before the started flag is set (active) or the
    /// capacity is applied (passive)
    Started,
    /// Started phase, after the started flag is set
    Started2,
    /// Active side, after the capacity mutation
    ErrorActive,
    /// Passive side, after the capacity mutation
    ErrorPassive,
    /// Active side, quiesce hold validation
    ErrorQuiesce,
    /// Done phase, before flags are cleared
    Done,
}

impl HookPoint {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Request => points::CONFIG_REQUEST,
            Self::Started => points::CONFIG_STARTED,
            Self::Started2 => points::CONFIG_STARTED2,
            Self::ErrorActive => points::CONFIG_ERROR_ACTIVE,
            Self::ErrorPassive => points::CONFIG_ERROR_PASSIVE,
            Self::ErrorQuiesce => points::CONFIG_ERROR_QUIESCE,
            Self::Done => points::CONFIG_DONE,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|point| point.name() == name)
    }

    pub fn all() -> &'static [HookPoint] {
        &[
            Self::Request,
            Self::Started,
            Self::Started2,
            Self::ErrorActive,
            Self::ErrorPassive,
            Self::ErrorQuiesce,
            Self::Done,
        ]
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Hook point names as used on the command line and in logs.
pub mod points {
    pub const CONFIG_REQUEST: &str = "config_request";
    pub const CONFIG_STARTED: &str = "config_started";
    pub const CONFIG_STARTED2: &str = "config_started2";
    pub const CONFIG_ERROR_ACTIVE: &str = "config_error_active";
    pub const CONFIG_ERROR_PASSIVE: &str = "config_error_passive";
    pub const CONFIG_ERROR_QUIESCE: &str = "config_error_quiesce";
    pub const CONFIG_DONE: &str = "config_done";
}

/// What the monitor does at a hook point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    /// Hold the state machine at this point for this invocation
    Pause,
    /// Force the error outcome
    Fail,
}

pub trait MonitorHooks: Send + Sync {
    fn check(&self, point: HookPoint) -> HookAction;
}

/// Production hooks: never interfere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl MonitorHooks for NoHooks {
    #[inline]
    fn check(&self, _point: HookPoint) -> HookAction {
        HookAction::Continue
    }
}

#[derive(Debug, Clone, Copy)]
struct Arm {
    action: HookAction,
    remaining: Option<u32>,
}

/// Test-controllable hooks.
///
/// An armed point fires its action until disarmed, or for a fixed number of
/// hits when armed with [`ScriptedHooks::arm_times`]. Every hit is recorded.
#[derive(Debug, Default)]
pub struct ScriptedHooks {
    armed: Mutex<HashMap<HookPoint, Arm>>,
    hits: Mutex<Vec<(HookPoint, HookAction)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, point: HookPoint, action: HookAction) {
        lock(&self.armed).insert(
            point,
            Arm {
                action,
                remaining: None,
            },
        );
    }

    pub fn arm_times(&self, point: HookPoint, action: HookAction, times: u32) {
        lock(&self.armed).insert(
            point,
            Arm {
                action,
                remaining: Some(times),
            },
        );
    }

    pub fn disarm(&self, point: HookPoint) {
        lock(&self.armed).remove(&point);
    }

    /// Every point that fired a non-`Continue` action, in order.
    pub fn hits(&self) -> Vec<(HookPoint, HookAction)> {
        lock(&self.hits).clone()
    }

    pub fn hit_count(&self, point: HookPoint) -> usize {
        lock(&self.hits).iter().filter(|(p, _)| *p == point).count()
    }
}

impl MonitorHooks for ScriptedHooks {
    fn check(&self, point: HookPoint) -> HookAction {
        let mut armed = lock(&self.armed);
        let Some(arm) = armed.get_mut(&point) else {
            return HookAction::Continue;
        };

        let action = arm.action;
        if let Some(remaining) = arm.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                armed.remove(&point);
            }
        }
        drop(armed);

        lock(&self.hits).push((point, action));
        action
    }
}

//! Downstream edge health

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the link to one downstream disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Enabled,
    Disabled,
    Broken,
    Gone,
    Invalid,
    /// Spun down but present
    Slumber,
}

impl LinkState {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "enabled" => Some(Self::Enabled),
            "disabled" => Some(Self::Disabled),
            "broken" => Some(Self::Broken),
            "gone" => Some(Self::Gone),
            "invalid" => Some(Self::Invalid),
            "slumber" => Some(Self::Slumber),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamEdge {
    pub state: LinkState,
    /// The disk has been timing out I/O
    #[serde(default)]
    pub timeout_errors: bool,
    /// The position is marked rebuild-logging
    #[serde(default)]
    pub rebuild_logging: bool,
}

impl DownstreamEdge {
    pub fn new(state: LinkState) -> Self {
        Self {
            state,
            timeout_errors: false,
            rebuild_logging: false,
        }
    }

    pub fn enabled() -> Self {
        Self::new(LinkState::Enabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupHealth {
    Optimal,
    Degraded,
    Disabled,
    Broken,
}

impl GroupHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::Degraded => "degraded",
            Self::Disabled => "disabled",
            Self::Broken => "broken",
        }
    }
}

impl fmt::Display for GroupHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeCounts {
    pub enabled: u32,
    pub disabled: u32,
    pub broken: u32,
    pub invalid: u32,
}

impl EdgeCounts {
    pub fn unavailable(&self) -> u32 {
        self.disabled + self.broken + self.invalid
    }
}

pub struct EdgeHealthEvaluator;

impl EdgeHealthEvaluator {
    /// An enabled edge that is rebuild-logging or timing out counts as broken.
    pub fn count(edges: &[DownstreamEdge]) -> EdgeCounts {
        let mut counts = EdgeCounts::default();
        for edge in edges {
            match edge.state {
                LinkState::Enabled | LinkState::Slumber
                    if edge.rebuild_logging || edge.timeout_errors =>
                {
                    counts.broken += 1
                }
                LinkState::Enabled | LinkState::Slumber => counts.enabled += 1,
                LinkState::Disabled => counts.disabled += 1,
                LinkState::Broken | LinkState::Gone => counts.broken += 1,
                LinkState::Invalid => counts.invalid += 1,
            }
        }
        counts
    }

    pub fn evaluate(edges: &[DownstreamEdge], parity_disks: u32) -> GroupHealth {
        let counts = Self::count(edges);
        let unavailable = counts.unavailable();
        if unavailable == 0 {
            GroupHealth::Optimal
        } else if unavailable <= parity_disks {
            GroupHealth::Degraded
        } else if counts.broken > parity_disks {
            GroupHealth::Broken
        } else {
            GroupHealth::Disabled
        }
    }
}

//! Clustered flag word

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Flags published to the peer through cluster memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterFlags(u64);

impl ClusterFlags {
    pub const EMPTY: Self = Self(0);

    // ===== Quiesce (base configuration) =====

    /// Hold I/O quiesced until the holder releases it
    pub const QUIESCE_HOLD: Self = Self(0x0000_0001);
    /// This side has drained all in-flight I/O
    pub const QUIESCED: Self = Self(0x0000_0002);

    // ===== Rebuild logging evaluation (owned by the rebuild subsystem) =====

    pub const EVAL_RL_REQ: Self = Self(0x0000_0100);
    pub const EVAL_RL_STARTED: Self = Self(0x0000_0200);
    pub const EVAL_RL_DONE_BROKEN: Self = Self(0x0000_0400);

    // ===== Configuration change =====

    pub const CHANGE_CONFIG_REQ: Self = Self(0x0400_0000);
    pub const CHANGE_CONFIG_STARTED: Self = Self(0x0800_0000);
    pub const CHANGE_CONFIG_DONE_ERROR: Self = Self(0x1000_0000);

    /// Every flag owned by the configuration change protocol.
    pub const CHANGE_CONFIG_MASK: Self = Self(
        Self::CHANGE_CONFIG_REQ.0 | Self::CHANGE_CONFIG_STARTED.0 | Self::CHANGE_CONFIG_DONE_ERROR.0,
    );

    const NAMES: [(ClusterFlags, &'static str); 8] = [
        (Self::QUIESCE_HOLD, "QUIESCE_HOLD"),
        (Self::QUIESCED, "QUIESCED"),
        (Self::EVAL_RL_REQ, "EVAL_RL_REQ"),
        (Self::EVAL_RL_STARTED, "EVAL_RL_STARTED"),
        (Self::EVAL_RL_DONE_BROKEN, "EVAL_RL_DONE_BROKEN"),
        (Self::CHANGE_CONFIG_REQ, "CHANGE_CONFIG_REQ"),
        (Self::CHANGE_CONFIG_STARTED, "CHANGE_CONFIG_STARTED"),
        (Self::CHANGE_CONFIG_DONE_ERROR, "CHANGE_CONFIG_DONE_ERROR"),
    ];

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// All bits of `other` are set.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Any bit of `other` is set.
    pub fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for ClusterFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ClusterFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

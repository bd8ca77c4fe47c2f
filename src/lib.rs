//! raidgroup - online capacity change and background verify for a raid group
//!
//! - `geometry`: raid layouts and metadata positions
//! - `metadata`: non-paged record, per-chunk bits, persistence
//! - `raid_group`: the group object, capacity mutation, relocation, health
//! - `change_config`: the dual-controller capacity change protocol
//! - `verify`: verify checkpoints and their engine
//! - `controller`: one SP's monitor loop over all of the above

pub mod change_config;
pub mod cli;
pub mod cluster;
pub mod controller;
pub mod geometry;
pub mod hooks;
pub mod lifecycle;
pub mod metadata;
pub mod observability;
pub mod raid_group;
pub mod transport;
pub mod verify;

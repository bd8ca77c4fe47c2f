//! Quiesce / drain protocol
//!
//! Before the active side changes geometry, both sides must have drained
//! in-flight I/O. The active side raises `QUIESCE_HOLD` and the quiesce
//! and unquiesce conditions; the passive side follows the peer's hold.
//!
//! ```text
//! start_drain ──► HOLD + Quiesce + Unquiesce ──► QUIESCED (in_flight == 0)
//!                          ...episode...
//! finish ──► clear HOLD ──► Unquiesce clears QUIESCED
//! ```

use crate::cluster::{ClusterFlags, ClusterLink, ClusterMemory};
use crate::lifecycle::{Condition, Lifecycle, LifecycleResult, LifecycleStatus};
use crate::observability::{log_event_with_fields, Event};
use crate::raid_group::RaidGroup;

/// Result of asking for a drained group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// Both sides are quiesced
    Ready,
    /// Quiesce requested; run again later
    Pending,
}

pub struct QuiesceDrain;

impl QuiesceDrain {
    fn drained(link: &ClusterLink) -> bool {
        link.is_local_flag_set(ClusterFlags::QUIESCED)
            && (!link.is_peer_present() || link.is_peer_flag_set(ClusterFlags::QUIESCED))
    }

    fn raise_hold(
        group: &RaidGroup,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> LifecycleResult<()> {
        if !link.is_local_flag_set(ClusterFlags::QUIESCE_HOLD) {
            link.set_local_flag(ClusterFlags::QUIESCE_HOLD);
            log_event_with_fields(
                Event::QuiesceHold,
                &[
                    ("group", group.id()),
                    ("in_flight", group.in_flight_io().to_string().as_str()),
                ],
            );
        }
        lifecycle.set_condition(Condition::Quiesce)?;
        lifecycle.set_condition(Condition::Unquiesce)
    }

    /// Ready once this side and a present peer both report `QUIESCED`.
    pub fn start_drain(
        group: &RaidGroup,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> LifecycleResult<DrainStatus> {
        if Self::drained(link) {
            return Ok(DrainStatus::Ready);
        }
        Self::raise_hold(group, link, lifecycle)?;
        Ok(DrainStatus::Pending)
    }

    /// Quiesce condition handler.
    pub fn run_quiesce(
        group: &RaidGroup,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> LifecycleResult<LifecycleStatus> {
        if group.in_flight_io() > 0 {
            lifecycle.reschedule(0)?;
            return Ok(LifecycleStatus::Reschedule);
        }
        if !link.is_local_flag_set(ClusterFlags::QUIESCED) {
            link.set_local_flag(ClusterFlags::QUIESCED);
            log_event_with_fields(Event::QuiesceComplete, &[("group", group.id())]);
        }
        lifecycle.clear_current_condition()?;
        Ok(LifecycleStatus::Done)
    }

    /// Unquiesce condition handler. Waits while the hold is raised.
    pub fn run_unquiesce(
        group: &RaidGroup,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> LifecycleResult<LifecycleStatus> {
        if link.is_local_flag_set(ClusterFlags::QUIESCE_HOLD) {
            return Ok(LifecycleStatus::Done);
        }
        if link.is_local_flag_set(ClusterFlags::QUIESCED) {
            link.clear_local_flag(ClusterFlags::QUIESCED);
            log_event_with_fields(Event::QuiesceReleased, &[("group", group.id())]);
        }
        lifecycle.clear_current_condition()?;
        Ok(LifecycleStatus::Done)
    }

    /// Passive side: hold as well while the peer holds for a config change.
    ///
    /// Returns whether the hold was raised.
    pub fn follow_peer_hold(
        group: &RaidGroup,
        peer: &ClusterMemory,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> LifecycleResult<bool> {
        let peer_changing = peer
            .flags
            .intersects(ClusterFlags::CHANGE_CONFIG_REQ | ClusterFlags::CHANGE_CONFIG_STARTED);
        if !peer.flags.contains(ClusterFlags::QUIESCE_HOLD)
            || !peer_changing
            || link.is_local_flag_set(ClusterFlags::QUIESCE_HOLD)
        {
            return Ok(false);
        }
        Self::raise_hold(group, link, lifecycle)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::link_pair;
    use crate::geometry::RaidType;
    use crate::lifecycle::ConditionSet;

    fn group() -> RaidGroup {
        RaidGroup::new("rg-q", 5, RaidType::Raid5, 128, 8, 8192 * 4).unwrap()
    }

    #[test]
    fn test_standalone_drain() {
        let group = group();
        let mut link = ClusterLink::standalone();
        let mut conditions = ConditionSet::new();

        assert_eq!(
            QuiesceDrain::start_drain(&group, &mut link, &mut conditions),
            Ok(DrainStatus::Pending)
        );
        assert!(link.is_local_flag_set(ClusterFlags::QUIESCE_HOLD));
        assert!(conditions.is_set(Condition::Quiesce));
        assert!(conditions.is_set(Condition::Unquiesce));

        conditions.begin(Condition::Quiesce);
        QuiesceDrain::run_quiesce(&group, &mut link, &mut conditions).unwrap();
        assert!(!conditions.is_set(Condition::Quiesce));

        assert_eq!(
            QuiesceDrain::start_drain(&group, &mut link, &mut conditions),
            Ok(DrainStatus::Ready)
        );
    }

    #[test]
    fn test_quiesce_waits_for_in_flight() {
        let group = group();
        let mut link = ClusterLink::standalone();
        let mut conditions = ConditionSet::new();
        group.begin_io();

        conditions.begin(Condition::Quiesce);
        assert_eq!(
            QuiesceDrain::run_quiesce(&group, &mut link, &mut conditions),
            Ok(LifecycleStatus::Reschedule)
        );
        assert!(!link.is_local_flag_set(ClusterFlags::QUIESCED));

        group.end_io();
        assert_eq!(
            QuiesceDrain::run_quiesce(&group, &mut link, &mut conditions),
            Ok(LifecycleStatus::Done)
        );
        assert!(link.is_local_flag_set(ClusterFlags::QUIESCED));
    }

    #[test]
    fn test_unquiesce_waits_for_hold_release() {
        let group = group();
        let mut link = ClusterLink::standalone();
        let mut conditions = ConditionSet::new();
        link.set_local_flag(ClusterFlags::QUIESCE_HOLD | ClusterFlags::QUIESCED);
        conditions.set_condition(Condition::Unquiesce).unwrap();
        conditions.begin(Condition::Unquiesce);

        QuiesceDrain::run_unquiesce(&group, &mut link, &mut conditions).unwrap();
        assert!(link.is_local_flag_set(ClusterFlags::QUIESCED));
        assert!(conditions.is_set(Condition::Unquiesce));

        link.clear_local_flag(ClusterFlags::QUIESCE_HOLD);
        QuiesceDrain::run_unquiesce(&group, &mut link, &mut conditions).unwrap();
        assert!(!link.is_local_flag_set(ClusterFlags::QUIESCED));
        assert!(!conditions.is_set(Condition::Unquiesce));
    }

    #[test]
    fn test_drain_waits_for_peer() {
        let group = group();
        let (mut a, _b) = link_pair();
        let mut conditions = ConditionSet::new();
        a.set_local_flag(ClusterFlags::QUIESCED);

        assert_eq!(
            QuiesceDrain::start_drain(&group, &mut a, &mut conditions),
            Ok(DrainStatus::Pending)
        );
    }

    #[test]
    fn test_follow_only_for_config_change() {
        let group = group();
        let mut link = ClusterLink::standalone();
        let mut conditions = ConditionSet::new();

        let mut peer = ClusterMemory::default();
        peer.flags.insert(ClusterFlags::QUIESCE_HOLD);
        assert_eq!(
            QuiesceDrain::follow_peer_hold(&group, &peer, &mut link, &mut conditions),
            Ok(false)
        );

        peer.flags.insert(ClusterFlags::CHANGE_CONFIG_REQ);
        assert_eq!(
            QuiesceDrain::follow_peer_hold(&group, &peer, &mut link, &mut conditions),
            Ok(true)
        );
        assert!(link.is_local_flag_set(ClusterFlags::QUIESCE_HOLD));
    }
}

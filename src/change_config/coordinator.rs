//! Dual-controller configuration change coordinator
//!
//! Both controllers run the same automaton. They agree through the flags
//! each publishes in cluster memory:
//!
//! - `Request`: publish `CHANGE_CONFIG_REQ`, wait for the peer's
//! - `Started` (active): drain, publish `STARTED`, wait for the peer's,
//!   check quiesce holds, apply the capacity, relocate paged metadata
//! - `Started` (passive): on the active side's `STARTED`, apply the same
//!   capacity and publish `STARTED`
//! - `Done`: publish `DONE_ERROR` on failure, clear the flags, roll back
//!   on error, complete the pending request
//!
//! A `DONE_ERROR` seen from the peer at any point of the episode turns the
//! local outcome into an error, so both sides either keep the new capacity
//! or both revert to the original one.

use std::sync::Arc;

use super::drain::{DrainStatus, QuiesceDrain};
use super::errors::ConfigChangeResult;
use super::request::{
    CapacityChangeRequest, PendingRequest, RequestAdmission, RequestCompletion, RequestStatus,
};
use super::state::{ConfigChangeOutcome, ConfigChangeState};
use crate::cluster::{ClusterFlags, ClusterLink, ClusterMemory};
use crate::geometry::round_capacity;
use crate::hooks::{HookAction, HookPoint, MonitorHooks};
use crate::lifecycle::{Condition, Lifecycle, LifecycleStatus};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::raid_group::{
    CapacityMutator, GroupHealth, PagedMetadataRelocator, RaidGroup, RelocationPlan,
    RelocationStep,
};
use crate::transport::BlockTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    Active,
    Passive,
}

impl ControllerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Passive => "passive",
        }
    }
}

/// Bookkeeping for one episode, reset when it ends.
#[derive(Debug, Default)]
struct Episode {
    /// Exported capacity before this side applied anything. `None` means
    /// nothing to revert.
    last_capacity: Option<u64>,
    /// A local step failed
    failed: bool,
    /// The peer published `DONE_ERROR` during this episode
    peer_error: bool,
    /// The peer asked again while this side was finishing
    rerequested: bool,
    relocation: Option<PagedMetadataRelocator>,
}

pub struct ConfigChangeCoordinator {
    group: Arc<RaidGroup>,
    sp: String,
    role: ControllerRole,
    state: ConfigChangeState,
    episode: Episode,
    /// Usurper queue: the request held until its episode is done
    pending: Option<PendingRequest>,
    completed: Vec<RequestCompletion>,
    hooks: Arc<dyn MonitorHooks>,
    metrics: Arc<MetricsRegistry>,
}

impl ConfigChangeCoordinator {
    pub fn new(
        group: Arc<RaidGroup>,
        sp: impl Into<String>,
        role: ControllerRole,
        hooks: Arc<dyn MonitorHooks>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            group,
            sp: sp.into(),
            role,
            state: ConfigChangeState::Idle,
            episode: Episode::default(),
            pending: None,
            completed: Vec::new(),
            hooks,
            metrics,
        }
    }

    pub fn state(&self) -> ConfigChangeState {
        self.state
    }

    pub fn state_name(&self) -> &'static str {
        self.state.state_name()
    }

    pub fn role(&self) -> ControllerRole {
        self.role
    }

    pub fn is_in_progress(&self) -> bool {
        self.state.is_in_progress()
    }

    pub fn last_capacity(&self) -> Option<u64> {
        self.episode.last_capacity
    }

    pub fn is_relocating(&self) -> bool {
        self.episode.relocation.is_some()
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending.is_some()
    }

    /// Requests completed since the last call.
    pub fn take_completed(&mut self) -> Vec<RequestCompletion> {
        std::mem::take(&mut self.completed)
    }

    // ===== Helpers =====

    fn log(&self, event: Event, extra: &[(&str, &str)]) {
        let mut fields = vec![
            ("group", self.group.id()),
            ("sp", self.sp.as_str()),
            ("role", self.role.as_str()),
        ];
        fields.extend_from_slice(extra);
        log_event_with_fields(event, &fields);
    }

    fn hook(&self, point: HookPoint) -> HookAction {
        let action = self.hooks.check(point);
        if action != HookAction::Continue {
            let action_name = format!("{:?}", action).to_lowercase();
            self.log(
                Event::MonitorHookFired,
                &[("hook", point.name()), ("action", action_name.as_str())],
            );
        }
        action
    }

    fn transition(
        &mut self,
        f: impl FnOnce(ConfigChangeState) -> ConfigChangeResult<ConfigChangeState>,
    ) -> ConfigChangeResult<()> {
        let from = self.state;
        self.state = f(from)?;
        self.log(
            Event::ConfigChangePhase,
            &[("from", from.state_name()), ("to", self.state.state_name())],
        );
        Ok(())
    }

    fn reschedule(lifecycle: &mut dyn Lifecycle) -> ConfigChangeResult<LifecycleStatus> {
        lifecycle.reschedule(0)?;
        Ok(LifecycleStatus::Reschedule)
    }

    /// Move to `Done(outcome)` and run again.
    fn finish_phase(
        &mut self,
        outcome: ConfigChangeOutcome,
        lifecycle: &mut dyn Lifecycle,
    ) -> ConfigChangeResult<LifecycleStatus> {
        if outcome == ConfigChangeOutcome::Error {
            self.episode.failed = true;
        }
        self.transition(|state| state.finish(outcome))?;
        Self::reschedule(lifecycle)
    }

    fn apply_capacity(&self, capacity: u64) -> bool {
        match CapacityMutator::apply(&self.group, capacity) {
            Ok(positions) => {
                self.log(
                    Event::CapacityApplied,
                    &[
                        ("capacity", capacity.to_string().as_str()),
                        (
                            "paged_metadata_lba",
                            positions.paged_metadata_lba.to_string().as_str(),
                        ),
                    ],
                );
                true
            }
            Err(e) => {
                self.log(
                    Event::CapacityApplyFailed,
                    &[
                        ("capacity", capacity.to_string().as_str()),
                        ("error", e.to_string().as_str()),
                    ],
                );
                false
            }
        }
    }

    // ===== Request admission =====

    /// Submit a capacity change.
    ///
    /// A capacity that rounds to exactly the current exported capacity
    /// completes immediately without touching the group.
    pub fn request_capacity_change(
        &mut self,
        request: CapacityChangeRequest,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> ConfigChangeResult<RequestAdmission> {
        self.metrics.increment_capacity_requests();
        let data_disks = self.group.data_disks();
        let requested = request.capacity.to_string();

        let target = match round_capacity(request.capacity, data_disks) {
            Ok(target) => target,
            Err(e) => {
                self.metrics.increment_capacity_requests_rejected();
                self.log(
                    Event::CapacityChangeRejected,
                    &[("requested", requested.as_str()), ("error", e.to_string().as_str())],
                );
                return Ok(RequestAdmission::Rejected {
                    id: request.id,
                    reason: "capacity cannot be laid out",
                });
            }
        };

        let current = self.group.exported_capacity();
        if current == target {
            self.metrics.increment_capacity_requests_noop();
            self.log(
                Event::CapacityChangeNoop,
                &[
                    ("requested", requested.as_str()),
                    ("capacity", current.to_string().as_str()),
                ],
            );
            return Ok(RequestAdmission::Completed(
                PendingRequest::new(request, target).complete(RequestStatus::Ok, current),
            ));
        }

        if self.state.is_in_progress() {
            self.log(
                Event::CapacityChangeRejected,
                &[("requested", requested.as_str()), ("reason", "in_progress")],
            );
            return Ok(RequestAdmission::AlreadyInProgress { id: request.id });
        }

        let health = self.group.health();
        if health != GroupHealth::Optimal {
            self.metrics.increment_capacity_requests_rejected();
            self.log(
                Event::CapacityChangeRejected,
                &[("requested", requested.as_str()), ("health", health.as_str())],
            );
            return Ok(RequestAdmission::Rejected {
                id: request.id,
                reason: "raid group is not optimal",
            });
        }

        self.episode = Episode::default();
        self.pending = Some(PendingRequest::new(request, target));
        link.set_capacity_expansion_blocks(target);
        self.transition(ConfigChangeState::begin_request)?;
        lifecycle.set_condition(Condition::ConfigurationChange)?;
        lifecycle.reschedule(0)?;

        self.log(
            Event::CapacityChangeRequested,
            &[
                ("requested", requested.as_str()),
                ("target", target.to_string().as_str()),
                ("current", current.to_string().as_str()),
            ],
        );
        Ok(RequestAdmission::Queued {
            id: request.id,
            target_capacity: target,
        })
    }

    // ===== Peer events =====

    /// Apply one peer snapshot. Called for every snapshot, in order.
    pub fn on_peer_update(
        &mut self,
        peer: &ClusterMemory,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> ConfigChangeResult<()> {
        let peer_error = peer.flags.contains(ClusterFlags::CHANGE_CONFIG_DONE_ERROR);
        if self.state.is_in_progress() && peer_error && !self.episode.peer_error {
            self.episode.peer_error = true;
            self.log(Event::ConfigChangeFailed, &[("reason", "peer_done_error")]);
        }

        let peer_requesting = peer.flags.contains(ClusterFlags::CHANGE_CONFIG_REQ)
            && !peer.flags.contains(ClusterFlags::CHANGE_CONFIG_STARTED)
            && !peer_error;
        if peer_requesting && !link.is_local_flag_set(ClusterFlags::CHANGE_CONFIG_REQ) {
            match self.state {
                ConfigChangeState::Idle => {
                    self.episode = Episode::default();
                    self.transition(ConfigChangeState::begin_request)?;
                    lifecycle.set_condition(Condition::ConfigurationChange)?;
                    self.log(
                        Event::ConfigChangeJoined,
                        &[(
                            "peer_capacity",
                            peer.capacity_expansion_blocks.to_string().as_str(),
                        )],
                    );
                }
                ConfigChangeState::Done(_) => self.episode.rerequested = true,
                ConfigChangeState::Request | ConfigChangeState::Started => {}
            }
        }

        QuiesceDrain::follow_peer_hold(&self.group, peer, link, lifecycle)?;

        if self.state.is_in_progress() {
            lifecycle.reschedule(0)?;
        }
        Ok(())
    }

    /// The peer is gone: this side owns the group from now on.
    pub fn on_peer_contact_lost(&mut self, lifecycle: &mut dyn Lifecycle) -> ConfigChangeResult<()> {
        let previous = self.role;
        self.role = ControllerRole::Active;
        self.log(
            Event::PeerContactLost,
            &[
                ("previous_role", previous.as_str()),
                ("state", self.state.state_name()),
            ],
        );
        self.group.peer_died_cleanup();

        if self.state.is_in_progress() {
            lifecycle.set_condition(Condition::ConfigurationChange)?;
            lifecycle.reschedule(0)?;
        }
        Ok(())
    }

    // ===== Condition handler =====

    /// Configuration change condition handler.
    pub fn run_configuration_change(
        &mut self,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
        transport: &mut dyn BlockTransport,
    ) -> ConfigChangeResult<LifecycleStatus> {
        match self.state {
            ConfigChangeState::Idle => {
                lifecycle.clear_current_condition()?;
                Ok(LifecycleStatus::Done)
            }
            ConfigChangeState::Request => self.run_request(link, lifecycle),
            ConfigChangeState::Started => match self.role {
                ControllerRole::Active => self.run_active_started(link, lifecycle, transport),
                ControllerRole::Passive => self.run_passive_started(link, lifecycle),
            },
            ConfigChangeState::Done(outcome) => self.run_done(outcome, link, lifecycle),
        }
    }

    fn run_request(
        &mut self,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> ConfigChangeResult<LifecycleStatus> {
        if self.episode.peer_error {
            return self.finish_phase(ConfigChangeOutcome::Error, lifecycle);
        }

        let peer_waiting = link.is_peer_present()
            && !link.is_peer_flag_set(ClusterFlags::CHANGE_CONFIG_REQ);

        // Joined on the peer's request, which is gone again.
        if peer_waiting && self.pending.is_none() {
            link.clear_local_flag(ClusterFlags::CHANGE_CONFIG_REQ);
            self.transition(ConfigChangeState::abandon)?;
            self.episode = Episode::default();
            lifecycle.clear_current_condition()?;
            return Ok(LifecycleStatus::Done);
        }

        if !link.is_local_flag_set(ClusterFlags::CHANGE_CONFIG_REQ) {
            link.set_local_flag(ClusterFlags::CHANGE_CONFIG_REQ);
            return Self::reschedule(lifecycle);
        }

        match self.hook(HookPoint::Request) {
            HookAction::Pause => return Ok(LifecycleStatus::Done),
            HookAction::Fail => return self.finish_phase(ConfigChangeOutcome::Error, lifecycle),
            HookAction::Continue => {}
        }

        if peer_waiting {
            return Ok(LifecycleStatus::Done);
        }

        let peer_blocks = link.peer_capacity_expansion_blocks();
        let adopt = match self.role {
            ControllerRole::Passive => peer_blocks != 0,
            ControllerRole::Active => link.capacity_expansion_blocks() == 0 && peer_blocks != 0,
        };
        if adopt {
            link.set_capacity_expansion_blocks(peer_blocks);
        }
        if link.capacity_expansion_blocks() == 0 {
            self.log(Event::ConfigChangeFailed, &[("reason", "no_target_capacity")]);
            return self.finish_phase(ConfigChangeOutcome::Error, lifecycle);
        }

        self.transition(ConfigChangeState::start)?;
        Self::reschedule(lifecycle)
    }

    fn run_active_started(
        &mut self,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
        transport: &mut dyn BlockTransport,
    ) -> ConfigChangeResult<LifecycleStatus> {
        if self.episode.relocation.is_some() {
            return self.pump_relocation(lifecycle, transport);
        }
        if self.episode.failed {
            return self.finish_phase(ConfigChangeOutcome::Error, lifecycle);
        }

        if QuiesceDrain::start_drain(&self.group, link, lifecycle)? == DrainStatus::Pending {
            return Ok(LifecycleStatus::Pending);
        }

        match self.hook(HookPoint::Started) {
            HookAction::Pause => return Ok(LifecycleStatus::Done),
            HookAction::Fail => return self.finish_phase(ConfigChangeOutcome::Error, lifecycle),
            HookAction::Continue => {}
        }

        link.set_local_flag(ClusterFlags::CHANGE_CONFIG_STARTED);

        match self.hook(HookPoint::Started2) {
            HookAction::Pause => return Ok(LifecycleStatus::Done),
            HookAction::Fail => return self.finish_phase(ConfigChangeOutcome::Error, lifecycle),
            HookAction::Continue => {}
        }

        if self.episode.peer_error {
            return self.finish_phase(ConfigChangeOutcome::Error, lifecycle);
        }
        if link.is_peer_present() && !link.is_peer_flag_set(ClusterFlags::CHANGE_CONFIG_STARTED) {
            return Ok(LifecycleStatus::Done);
        }

        let quiesce_not_set = !link.is_local_flag_set(ClusterFlags::QUIESCE_HOLD)
            || (link.is_peer_present() && !link.is_peer_flag_set(ClusterFlags::QUIESCE_HOLD));
        match self.hook(HookPoint::ErrorQuiesce) {
            HookAction::Pause => return Ok(LifecycleStatus::Done),
            HookAction::Fail => {
                self.log(Event::QuiesceNotSet, &[("forced", "true")]);
                return self.finish_phase(ConfigChangeOutcome::Error, lifecycle);
            }
            HookAction::Continue => {}
        }
        if quiesce_not_set {
            // Retried until both holds show up.
            self.log(Event::QuiesceNotSet, &[("forced", "false")]);
            QuiesceDrain::start_drain(&self.group, link, lifecycle)?;
            return Self::reschedule(lifecycle);
        }

        let target = link.capacity_expansion_blocks();
        let current = self.group.exported_capacity();
        self.episode.last_capacity.get_or_insert(current);

        let applied = self.apply_capacity(target);
        if self.hook(HookPoint::ErrorActive) == HookAction::Fail || !applied {
            return self.finish_phase(ConfigChangeOutcome::Error, lifecycle);
        }

        let layout = self.group.layout_snapshot();
        let plan = RelocationPlan::new(
            &layout.positions,
            layout.geometry.raid_type(),
            layout.data_disks(),
        );
        self.episode.relocation = Some(PagedMetadataRelocator::new(plan));
        self.log(
            Event::RelocationStart,
            &[
                ("paged_metadata_lba", plan.paged_metadata_lba.to_string().as_str()),
                (
                    "paged_metadata_capacity",
                    plan.paged_metadata_capacity.to_string().as_str(),
                ),
            ],
        );
        Self::reschedule(lifecycle)
    }

    /// Issue one relocation I/O and feed its completion back.
    fn pump_relocation(
        &mut self,
        lifecycle: &mut dyn Lifecycle,
        transport: &mut dyn BlockTransport,
    ) -> ConfigChangeResult<LifecycleStatus> {
        let Some(mut relocator) = self.episode.relocation.take() else {
            return Self::reschedule(lifecycle);
        };
        let Some(op) = relocator.next_operation() else {
            return self.finish_phase(ConfigChangeOutcome::Success, lifecycle);
        };

        let completion = transport.issue_block_op(&op);
        self.metrics.increment_relocation_ios();

        match relocator.resume(&completion) {
            Ok(RelocationStep::Done) => {
                self.log(
                    Event::RelocationComplete,
                    &[("ios", relocator.completed_ios().to_string().as_str())],
                );
                self.finish_phase(ConfigChangeOutcome::Success, lifecycle)
            }
            Ok(_) => {
                self.episode.relocation = Some(relocator);
                Self::reschedule(lifecycle)
            }
            Err(e) => {
                self.log(Event::RelocationFailed, &[("error", e.to_string().as_str())]);
                self.finish_phase(ConfigChangeOutcome::Error, lifecycle)
            }
        }
    }

    fn run_passive_started(
        &mut self,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> ConfigChangeResult<LifecycleStatus> {
        let local_started = link.is_local_flag_set(ClusterFlags::CHANGE_CONFIG_STARTED);
        if self.episode.peer_error && !local_started {
            return self.finish_phase(ConfigChangeOutcome::Error, lifecycle);
        }
        if !local_started && !link.is_peer_flag_set(ClusterFlags::CHANGE_CONFIG_STARTED) {
            return Ok(LifecycleStatus::Done);
        }

        match self.hook(HookPoint::Started) {
            HookAction::Pause => return Ok(LifecycleStatus::Done),
            HookAction::Fail => return self.finish_phase(ConfigChangeOutcome::Error, lifecycle),
            HookAction::Continue => {}
        }

        if !local_started {
            link.clear_local_flag(ClusterFlags::CHANGE_CONFIG_DONE_ERROR);
            let current = self.group.exported_capacity();
            self.episode.last_capacity.get_or_insert(current);

            let applied = self.apply_capacity(link.capacity_expansion_blocks());
            if self.hook(HookPoint::ErrorPassive) == HookAction::Fail || !applied {
                self.episode.failed = true;
                link.set_local_flag(ClusterFlags::CHANGE_CONFIG_DONE_ERROR);
            }
            link.set_local_flag(ClusterFlags::CHANGE_CONFIG_STARTED);
            return Ok(LifecycleStatus::Done);
        }

        match self.hook(HookPoint::Started2) {
            HookAction::Pause => return Ok(LifecycleStatus::Done),
            HookAction::Fail => return self.finish_phase(ConfigChangeOutcome::Error, lifecycle),
            HookAction::Continue => {}
        }

        // The active side leaves Started once it has relocated.
        if !link.is_peer_flag_set(ClusterFlags::CHANGE_CONFIG_STARTED) {
            let outcome = if self.episode.failed {
                ConfigChangeOutcome::Error
            } else {
                ConfigChangeOutcome::Success
            };
            return self.finish_phase(outcome, lifecycle);
        }
        Ok(LifecycleStatus::Done)
    }

    fn run_done(
        &mut self,
        outcome: ConfigChangeOutcome,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> ConfigChangeResult<LifecycleStatus> {
        if outcome == ConfigChangeOutcome::Error
            && !link.is_local_flag_set(ClusterFlags::CHANGE_CONFIG_DONE_ERROR)
        {
            link.set_local_flag(ClusterFlags::CHANGE_CONFIG_DONE_ERROR);
            return Self::reschedule(lifecycle);
        }
        if outcome == ConfigChangeOutcome::Success && self.episode.peer_error {
            return self.finish_phase(ConfigChangeOutcome::Error, lifecycle);
        }

        match self.hook(HookPoint::Done) {
            HookAction::Pause => return Ok(LifecycleStatus::Done),
            HookAction::Fail if outcome == ConfigChangeOutcome::Success => {
                return self.finish_phase(ConfigChangeOutcome::Error, lifecycle);
            }
            HookAction::Fail | HookAction::Continue => {}
        }

        let in_flight_flags = ClusterFlags::CHANGE_CONFIG_REQ | ClusterFlags::CHANGE_CONFIG_STARTED;
        if link.local().flags.intersects(in_flight_flags) {
            link.clear_local_flag(in_flight_flags);
            return Self::reschedule(lifecycle);
        }
        if link.is_peer_flag_set(ClusterFlags::CHANGE_CONFIG_STARTED) {
            return Ok(LifecycleStatus::Done);
        }

        self.finish_episode(outcome, link, lifecycle)
    }

    fn finish_episode(
        &mut self,
        outcome: ConfigChangeOutcome,
        link: &mut ClusterLink,
        lifecycle: &mut dyn Lifecycle,
    ) -> ConfigChangeResult<LifecycleStatus> {
        let episode = std::mem::take(&mut self.episode);

        if outcome == ConfigChangeOutcome::Error {
            if let Some(original) = episode.last_capacity {
                if self.apply_capacity(original) {
                    self.log(
                        Event::CapacityReverted,
                        &[("capacity", original.to_string().as_str())],
                    );
                }
            }
        }

        let exported = self.group.exported_capacity();
        if let Some(pending) = self.pending.take() {
            let status = match outcome {
                ConfigChangeOutcome::Success => RequestStatus::Ok,
                ConfigChangeOutcome::Error => RequestStatus::Failed,
            };
            self.completed.push(pending.complete(status, exported));
        }

        link.clear_local_flag(
            ClusterFlags::CHANGE_CONFIG_DONE_ERROR | ClusterFlags::QUIESCE_HOLD,
        );
        link.set_capacity_expansion_blocks(0);

        let event = match outcome {
            ConfigChangeOutcome::Success => {
                self.metrics.increment_episodes_committed();
                Event::ConfigChangeComplete
            }
            ConfigChangeOutcome::Error => {
                self.metrics.increment_episodes_rolled_back();
                Event::ConfigChangeFailed
            }
        };
        self.log(
            event,
            &[
                ("outcome", outcome.as_str()),
                ("capacity", exported.to_string().as_str()),
            ],
        );

        if episode.rerequested {
            self.transition(ConfigChangeState::rerequest)?;
            return Self::reschedule(lifecycle);
        }
        self.transition(ConfigChangeState::complete)?;
        lifecycle.clear_current_condition()?;
        Ok(LifecycleStatus::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RaidType;
    use crate::hooks::{NoHooks, ScriptedHooks};
    use crate::lifecycle::ConditionSet;
    use crate::raid_group::{DownstreamEdge, LinkState};
    use crate::transport::{BlockOpcode, SimulatedTransport};

    struct Solo {
        coordinator: ConfigChangeCoordinator,
        group: Arc<RaidGroup>,
        link: ClusterLink,
        conditions: ConditionSet,
        transport: SimulatedTransport,
    }

    fn solo(hooks: Arc<dyn MonitorHooks>) -> Solo {
        solo_at(50_000, hooks)
    }

    fn solo_at(capacity: u64, hooks: Arc<dyn MonitorHooks>) -> Solo {
        let group =
            Arc::new(RaidGroup::new("rg-c", 5, RaidType::Raid5, 128, 8, capacity).unwrap());
        Solo {
            coordinator: ConfigChangeCoordinator::new(
                Arc::clone(&group),
                "a",
                ControllerRole::Active,
                hooks,
                Arc::new(MetricsRegistry::new()),
            ),
            group,
            link: ClusterLink::standalone(),
            conditions: ConditionSet::new(),
            transport: SimulatedTransport::new(),
        }
    }

    impl Solo {
        /// Run every set condition once, the way the controller does.
        fn tick(&mut self) {
            for condition in self.conditions.conditions() {
                self.conditions.begin(condition);
                match condition {
                    Condition::Quiesce => {
                        QuiesceDrain::run_quiesce(&self.group, &mut self.link, &mut self.conditions)
                            .unwrap();
                    }
                    Condition::Unquiesce => {
                        QuiesceDrain::run_unquiesce(
                            &self.group,
                            &mut self.link,
                            &mut self.conditions,
                        )
                        .unwrap();
                    }
                    Condition::ConfigurationChange => {
                        self.coordinator
                            .run_configuration_change(
                                &mut self.link,
                                &mut self.conditions,
                                &mut self.transport,
                            )
                            .unwrap();
                    }
                    Condition::Verify => {}
                }
                self.conditions.end();
            }
        }

        fn run(&mut self) {
            for _ in 0..200 {
                if self.conditions.is_empty() {
                    return;
                }
                self.tick();
            }
            panic!("did not settle in state {}", self.coordinator.state_name());
        }

        fn request(&mut self, capacity: u64) -> RequestAdmission {
            self.coordinator
                .request_capacity_change(
                    CapacityChangeRequest::new(capacity),
                    &mut self.link,
                    &mut self.conditions,
                )
                .unwrap()
        }
    }

    #[test]
    fn test_noop_request_touches_nothing() {
        // 7 chunk stripes of 8192 blocks
        let mut solo = solo_at(57_344, Arc::new(NoHooks));
        let generation = solo.group.layout_snapshot().stripe_lock_generation;

        let admission = solo.request(50_001);
        let RequestAdmission::Completed(completion) = admission else {
            panic!("expected immediate completion, got {:?}", admission);
        };
        assert!(completion.is_ok());
        assert_eq!(solo.coordinator.state(), ConfigChangeState::Idle);
        assert!(solo.conditions.is_empty());
        assert_eq!(solo.group.layout_snapshot().stripe_lock_generation, generation);
        assert!(solo.transport.issued().is_empty());
    }

    #[test]
    fn test_standalone_expansion_relocates() {
        let mut solo = solo(Arc::new(NoHooks));
        assert!(solo.request(100_000).is_queued());
        solo.run();

        assert_eq!(solo.coordinator.state(), ConfigChangeState::Idle);
        assert_eq!(solo.group.exported_capacity(), 106_496);
        assert!(solo.link.local().flags.is_empty());
        assert_eq!(solo.link.capacity_expansion_blocks(), 0);
        assert!(!solo.coordinator.is_relocating());
        assert!(!solo.coordinator.has_pending_request());
        assert_eq!(solo.coordinator.last_capacity(), None);

        let completed = solo.coordinator.take_completed();
        assert_eq!(completed.len(), 1);
        assert!(completed[0].is_ok());
        assert_eq!(completed[0].exported_capacity, 106_496);

        let zeroes = solo.transport.issued_with(BlockOpcode::Zero);
        assert_eq!(zeroes.len(), 2);
        // Paged metadata starts at 106496 / 4 on each disk
        assert_eq!(zeroes[0].lba, 26_624);
        assert!(!solo.transport.issued_with(BlockOpcode::WriteVerify).is_empty());
    }

    #[test]
    fn test_unaligned_current_capacity_is_not_a_noop() {
        // 50000 is not on a chunk stripe; asking for it again aligns it.
        let mut solo = solo(Arc::new(NoHooks));
        let RequestAdmission::Queued { target_capacity, .. } = solo.request(50_000) else {
            panic!("expected the request to be queued");
        };
        assert_eq!(target_capacity, 57_344);
        solo.run();
        assert_eq!(solo.group.exported_capacity(), 57_344);
    }

    #[test]
    fn test_second_request_is_in_progress() {
        let mut solo = solo(Arc::new(NoHooks));
        assert!(solo.request(100_000).is_queued());
        assert!(matches!(
            solo.request(200_000),
            RequestAdmission::AlreadyInProgress { .. }
        ));
    }

    #[test]
    fn test_degraded_group_is_rejected() {
        let mut solo = solo(Arc::new(NoHooks));
        solo.group.set_edge(1, DownstreamEdge::new(LinkState::Disabled));
        assert!(matches!(
            solo.request(100_000),
            RequestAdmission::Rejected {
                reason: "raid group is not optimal",
                ..
            }
        ));
        assert_eq!(solo.coordinator.state(), ConfigChangeState::Idle);
    }

    #[test]
    fn test_relocation_failure_rolls_back() {
        let mut solo = solo(Arc::new(NoHooks));
        solo.transport.fail(BlockOpcode::WriteVerify, None);
        solo.request(100_000);
        solo.run();

        assert_eq!(solo.group.exported_capacity(), 50_000);
        let completed = solo.coordinator.take_completed();
        assert_eq!(completed[0].status, RequestStatus::Failed);
        assert!(solo.link.local().flags.is_empty());
    }

    #[test]
    fn test_quiesce_hook_fails_without_mutation() {
        let hooks = Arc::new(ScriptedHooks::new());
        hooks.arm(HookPoint::ErrorQuiesce, HookAction::Fail);
        let mut solo = solo(hooks.clone());
        let generation = solo.group.layout_snapshot().stripe_lock_generation;

        solo.request(100_000);
        solo.run();

        assert_eq!(solo.group.exported_capacity(), 50_000);
        assert_eq!(solo.group.layout_snapshot().stripe_lock_generation, generation);
        assert_eq!(hooks.hit_count(HookPoint::ErrorQuiesce), 1);
        assert!(!solo.coordinator.take_completed()[0].is_ok());
    }

    #[test]
    fn test_pause_holds_the_episode() {
        let hooks = Arc::new(ScriptedHooks::new());
        hooks.arm(HookPoint::Started, HookAction::Pause);
        let mut solo = solo(hooks.clone());
        solo.request(100_000);

        for _ in 0..20 {
            solo.tick();
        }
        assert_eq!(solo.coordinator.state(), ConfigChangeState::Started);
        assert_eq!(solo.group.exported_capacity(), 50_000);
        assert!(solo.coordinator.has_pending_request());
        assert_eq!(solo.coordinator.last_capacity(), None);

        hooks.disarm(HookPoint::Started);
        solo.run();
        assert_eq!(solo.group.exported_capacity(), 106_496);
    }

    #[test]
    fn test_idle_handler_clears_condition() {
        let mut solo = solo(Arc::new(NoHooks));
        solo.conditions
            .set_condition(Condition::ConfigurationChange)
            .unwrap();
        solo.tick();
        assert!(solo.conditions.is_empty());
    }
}

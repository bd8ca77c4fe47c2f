//! One storage processor's monitor loop
//!
//! A [`Controller`] owns everything one SP holds for a raid group: its
//! group object, its side of the cluster link, its condition set, the
//! configuration change coordinator and the verify engine.
//!
//! Each `tick()`:
//! 1. polls the link and hands every peer notification to the coordinator, oldest first
//! 2. runs every set condition once, in condition order
//! 3. publishes local cluster memory if it changed
//!
//! [`drive_pair`] alternates ticks between two controllers wired with
//! [`crate::cluster::link_pair`] until both have settled.

use std::sync::Arc;

use thiserror::Error;

use crate::change_config::{
    CapacityChangeRequest, ConfigChangeCoordinator, ConfigChangeError, ControllerRole,
    QuiesceDrain, RequestAdmission, RequestCompletion,
};
use crate::cluster::{ClusterLink, PeerNotification};
use crate::hooks::{MonitorHooks, NoHooks};
use crate::lifecycle::{Condition, ConditionSet, Lifecycle, LifecycleError, LifecycleStatus};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::raid_group::RaidGroup;
use crate::transport::{BlockTransport, SimulatedTransport};
use crate::verify::{
    CycleOutcome, ExtentUpstream, UpstreamEvents, VerifyCheckpointEngine, VerifyError, VerifyKind,
    VerifySettings,
};

/// Delay before retrying verify after upstream said busy or an I/O failed.
const VERIFY_RETRY_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("configuration change: {0}")]
    ConfigChange(#[from] ConfigChangeError),

    #[error("verify: {0}")]
    Verify(#[from] VerifyError),

    #[error("lifecycle: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("controllers did not settle after {ticks} ticks")]
    NotSettled { ticks: usize },
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Per-SP settings that do not depend on the group or the link.
#[derive(Clone)]
pub struct ControllerSetup {
    pub sp: String,
    pub role: ControllerRole,
    pub hooks: Arc<dyn MonitorHooks>,
    pub metrics: Arc<MetricsRegistry>,
    pub verify: VerifySettings,
}

impl ControllerSetup {
    pub fn new(sp: impl Into<String>, role: ControllerRole) -> Self {
        Self {
            sp: sp.into(),
            role,
            hooks: Arc::new(NoHooks),
            metrics: Arc::new(MetricsRegistry::new()),
            verify: VerifySettings::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn MonitorHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_verify_settings(mut self, verify: VerifySettings) -> Self {
        self.verify = verify;
        self
    }
}

pub struct Controller<T = SimulatedTransport, U = ExtentUpstream> {
    sp: String,
    group: Arc<RaidGroup>,
    link: ClusterLink,
    conditions: ConditionSet,
    coordinator: ConfigChangeCoordinator,
    verify: VerifyCheckpointEngine,
    transport: T,
    upstream: U,
    metrics: Arc<MetricsRegistry>,
}

impl Controller {
    /// A controller with an in-memory transport and an upstream that owns
    /// every block.
    pub fn simulated(setup: ControllerSetup, group: Arc<RaidGroup>, link: ClusterLink) -> Self {
        Self::new(
            setup,
            group,
            link,
            SimulatedTransport::new(),
            ExtentUpstream::fully_consumed(),
        )
    }
}

impl<T: BlockTransport, U: UpstreamEvents> Controller<T, U> {
    pub fn new(
        setup: ControllerSetup,
        group: Arc<RaidGroup>,
        link: ClusterLink,
        transport: T,
        upstream: U,
    ) -> Self {
        let coordinator = ConfigChangeCoordinator::new(
            Arc::clone(&group),
            setup.sp.clone(),
            setup.role,
            setup.hooks,
            Arc::clone(&setup.metrics),
        );
        let verify =
            VerifyCheckpointEngine::new(Arc::clone(&group), setup.verify, Arc::clone(&setup.metrics));
        Self {
            sp: setup.sp,
            group,
            link,
            conditions: ConditionSet::new(),
            coordinator,
            verify,
            transport,
            upstream,
            metrics: setup.metrics,
        }
    }

    // ===== Accessors =====

    pub fn sp(&self) -> &str {
        &self.sp
    }

    pub fn group(&self) -> &Arc<RaidGroup> {
        &self.group
    }

    pub fn link(&self) -> &ClusterLink {
        &self.link
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    pub fn coordinator(&self) -> &ConfigChangeCoordinator {
        &self.coordinator
    }

    pub fn verify_engine(&self) -> &VerifyCheckpointEngine {
        &self.verify
    }

    pub fn verify_engine_mut(&mut self) -> &mut VerifyCheckpointEngine {
        &mut self.verify
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    pub fn upstream_mut(&mut self) -> &mut U {
        &mut self.upstream
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// No episode running and no condition left to run.
    pub fn is_settled(&self) -> bool {
        !self.coordinator.is_in_progress() && self.conditions.is_empty()
    }

    pub fn take_completed(&mut self) -> Vec<RequestCompletion> {
        self.coordinator.take_completed()
    }

    // ===== Operations =====

    pub fn request_capacity_change(&mut self, capacity: u64) -> ControllerResult<RequestAdmission> {
        let admission = self.coordinator.request_capacity_change(
            CapacityChangeRequest::new(capacity),
            &mut self.link,
            &mut self.conditions,
        )?;
        self.link.publish();
        Ok(admission)
    }

    /// Mark a disk-relative range for `kind` and schedule the verify condition.
    pub fn mark_for_verify(
        &mut self,
        disk_lba: u64,
        blocks: u64,
        kind: VerifyKind,
    ) -> ControllerResult<()> {
        self.verify.mark_for_verify(disk_lba, blocks, kind)?;
        self.conditions.set_condition(Condition::Verify)?;
        Ok(())
    }

    /// Stop talking to the peer, as if this SP went down.
    pub fn sever_link(&mut self) {
        self.link.sever();
    }

    // ===== Monitor loop =====

    pub fn tick(&mut self) -> ControllerResult<()> {
        for notification in self.link.poll() {
            match notification {
                PeerNotification::MemoryUpdated(memory) => {
                    self.coordinator
                        .on_peer_update(&memory, &mut self.link, &mut self.conditions)?;
                }
                PeerNotification::ContactLost => {
                    self.coordinator.on_peer_contact_lost(&mut self.conditions)?;
                }
            }
        }

        for condition in self.conditions.conditions() {
            // An earlier handler may have cleared it.
            if !self.conditions.is_set(condition) {
                continue;
            }
            self.conditions.begin(condition);
            let result = self.run_condition(condition);
            self.conditions.end();
            result?;
        }
        self.conditions.take_reschedule();

        self.link.publish();
        Ok(())
    }

    fn run_condition(&mut self, condition: Condition) -> ControllerResult<LifecycleStatus> {
        let status = match condition {
            Condition::Quiesce => {
                QuiesceDrain::run_quiesce(&self.group, &mut self.link, &mut self.conditions)?
            }
            Condition::Unquiesce => {
                QuiesceDrain::run_unquiesce(&self.group, &mut self.link, &mut self.conditions)?
            }
            Condition::ConfigurationChange => self.coordinator.run_configuration_change(
                &mut self.link,
                &mut self.conditions,
                &mut self.transport,
            )?,
            Condition::Verify => self.run_verify()?,
        };
        Ok(status)
    }

    /// Verify condition handler: one cycle per invocation.
    fn run_verify(&mut self) -> ControllerResult<LifecycleStatus> {
        // Geometry may move under a running episode.
        if self.coordinator.is_in_progress() {
            return Ok(LifecycleStatus::Done);
        }
        if !self.verify.is_verify_needed(self.group.health()) {
            self.conditions.clear_current_condition()?;
            return Ok(LifecycleStatus::Done);
        }
        let Some(kind) = self.verify.next_verify() else {
            self.conditions.clear_current_condition()?;
            return Ok(LifecycleStatus::Done);
        };

        match self
            .verify
            .run_one_cycle(kind, &mut self.transport, &mut self.upstream)
        {
            Ok(CycleOutcome::Busy) | Ok(CycleOutcome::IoFailed { .. }) => {
                self.conditions.reschedule(VERIFY_RETRY_MS)?;
                Ok(LifecycleStatus::Reschedule)
            }
            Ok(_) => {
                self.conditions.reschedule(0)?;
                Ok(LifecycleStatus::Reschedule)
            }
            Err(e) => {
                // Verify never fails the group; the next pass retries.
                log_event_with_fields(
                    Event::VerifyIoFailed,
                    &[
                        ("group", self.group.id()),
                        ("sp", self.sp.as_str()),
                        ("kind", kind.as_str()),
                        ("error", e.to_string().as_str()),
                    ],
                );
                self.conditions.reschedule(VERIFY_RETRY_MS)?;
                Ok(LifecycleStatus::Reschedule)
            }
        }
    }
}

/// Tick `a` then `b` until both have settled. Returns the ticks used.
pub fn drive_pair<T1, U1, T2, U2>(
    a: &mut Controller<T1, U1>,
    b: &mut Controller<T2, U2>,
    max_ticks: usize,
) -> ControllerResult<usize>
where
    T1: BlockTransport,
    U1: UpstreamEvents,
    T2: BlockTransport,
    U2: UpstreamEvents,
{
    for tick in 1..=max_ticks {
        a.tick()?;
        b.tick()?;
        if a.is_settled() && b.is_settled() {
            return Ok(tick);
        }
    }
    Err(ControllerError::NotSettled { ticks: max_ticks })
}

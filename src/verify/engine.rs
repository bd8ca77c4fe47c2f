//! Verify checkpoint engine
//!
//! One checkpoint per verify kind walks the disk-relative address space:
//!
//! ```text
//! 0 ............. user_disk_capacity ............. metadata_disk_end
//! |  user chunks (paged bits)  |  paged metadata chunks (MDD bits)  |
//! ```
//!
//! A cycle works on one run of chunks starting at the checkpoint. A run
//! with the kind's bit clear is passed over without I/O. Reaching the end
//! of the paged metadata completes the pass.
//!
//! The NP lock is held only to read or move a checkpoint, never across
//! the verify I/O or an upstream call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::errors::{VerifyError, VerifyResult};
use super::upstream::{PermitRequest, PermitStatus, UpstreamEvents, VerifyReport};
use super::VerifyKind;
use crate::geometry::{CHUNK_SIZE, INVALID_LBA};
use crate::metadata::{NonPagedMetadata, MAX_MDD_SLOTS};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::raid_group::{GroupHealth, RaidGroup};
use crate::transport::{BlockOperation, BlockTransport};

pub const DEFAULT_CHUNKS_PER_CYCLE: u64 = 4;
pub const DEFAULT_PERSIST_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyRegion {
    /// Exported (user) area
    User,
    /// Paged metadata area
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifySettings {
    /// Administratively enabled kinds, as a mask of `VerifyKind::flag()`
    pub enabled_kinds: u8,
    /// Largest run of marked chunks verified by one I/O
    pub chunks_per_cycle: u64,
    /// Minimum time between rewrites of the persisted non-paged record
    pub persist_interval_ms: u64,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            enabled_kinds: VerifyKind::all_flags(),
            chunks_per_cycle: DEFAULT_CHUNKS_PER_CYCLE,
            persist_interval_ms: DEFAULT_PERSIST_INTERVAL_MS,
        }
    }
}

/// What one verify cycle did. Block counts are disk-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    NothingToDo,
    /// Checkpoint moved without I/O
    Skipped { start: u64, blocks: u64 },
    Verified { start: u64, blocks: u64 },
    /// Upstream busy or denied; retry later
    Busy,
    /// Verify I/O failed; checkpoint unchanged
    IoFailed { start: u64, blocks: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    user_end: u64,
    metadata_end: u64,
    data_disks: u64,
}

impl Bounds {
    fn user_chunks(&self) -> u64 {
        self.user_end / CHUNK_SIZE
    }
}

fn mdd_slot(metadata_chunk: u64) -> usize {
    usize::try_from(metadata_chunk)
        .unwrap_or(usize::MAX)
        .min(MAX_MDD_SLOTS - 1)
}

/// Close out a pass: the kind restarts at 0 if another pass was asked for.
fn finish_pass(md: &mut NonPagedMetadata, kind: VerifyKind) -> u64 {
    for bits in md.mdd_verify_bits.iter_mut() {
        *bits &= !kind.flag();
    }
    if md.is_verify_required(kind) {
        md.verify_required &= !kind.flag();
        0
    } else {
        INVALID_LBA
    }
}

pub struct VerifyCheckpointEngine {
    group: Arc<RaidGroup>,
    settings: VerifySettings,
    metrics: Arc<MetricsRegistry>,
    /// Monotonic time of the last rewrite
    last_persist: Option<Instant>,
    deferred_report: Option<VerifyReport>,
}

impl VerifyCheckpointEngine {
    pub fn new(group: Arc<RaidGroup>, settings: VerifySettings, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            group,
            settings,
            metrics,
            last_persist: None,
            deferred_report: None,
        }
    }

    pub fn settings(&self) -> &VerifySettings {
        &self.settings
    }

    pub fn is_enabled(&self, kind: VerifyKind) -> bool {
        self.settings.enabled_kinds & kind.flag() != 0
    }

    pub fn set_enabled(&mut self, kind: VerifyKind, enabled: bool) {
        if enabled {
            self.settings.enabled_kinds |= kind.flag();
        } else {
            self.settings.enabled_kinds &= !kind.flag();
        }
    }

    /// Best-effort read of a checkpoint.
    pub fn checkpoint(&self, kind: VerifyKind) -> u64 {
        self.group
            .metadata()
            .nonpaged_snapshot()
            .verify_checkpoints
            .get(kind)
    }

    pub fn deferred_report(&self) -> Option<&VerifyReport> {
        self.deferred_report.as_ref()
    }

    fn bounds(&self) -> Bounds {
        let layout = self.group.layout_snapshot();
        Bounds {
            user_end: layout.user_disk_capacity(),
            metadata_end: layout.metadata_disk_end(),
            data_disks: u64::from(layout.data_disks().max(1)),
        }
    }

    // ===== Scheduling =====

    /// Highest priority enabled kind with work in `region`.
    pub fn get_next_verify_type(&self, region: VerifyRegion) -> Option<VerifyKind> {
        let bounds = self.bounds();
        let md = self.group.metadata().nonpaged_snapshot();

        VerifyKind::PRIORITY
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .find(|kind| {
                let checkpoint = md.verify_checkpoints.get(*kind);
                match region {
                    VerifyRegion::User => {
                        checkpoint != INVALID_LBA && checkpoint < bounds.user_end
                    }
                    VerifyRegion::Metadata => {
                        (checkpoint != INVALID_LBA && checkpoint >= bounds.user_end)
                            || md.mdd_pending(*kind)
                    }
                }
            })
    }

    /// Next kind to run; paged metadata work goes before user work.
    pub fn next_verify(&self) -> Option<VerifyKind> {
        self.get_next_verify_type(VerifyRegion::Metadata)
            .or_else(|| self.get_next_verify_type(VerifyRegion::User))
    }

    /// Verify only runs on an optimal group with a checkpoint outstanding.
    pub fn is_verify_needed(&self, health: GroupHealth) -> bool {
        if health != GroupHealth::Optimal {
            return false;
        }
        let md = self.group.metadata().nonpaged_snapshot();
        VerifyKind::PRIORITY
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .any(|kind| md.verify_checkpoints.get(kind) != INVALID_LBA || md.mdd_pending(kind))
    }

    // ===== Marking =====

    /// Mark `[disk_lba, disk_lba + blocks)` for a `kind` verify.
    ///
    /// User chunks get paged bits, paged metadata chunks get MDD bits. The
    /// checkpoint moves back to the first marked chunk if it is past it.
    pub fn mark_for_verify(&self, disk_lba: u64, blocks: u64, kind: VerifyKind) -> VerifyResult<()> {
        if blocks == 0 {
            return Ok(());
        }
        let bounds = self.bounds();
        let end = disk_lba
            .checked_add(blocks)
            .filter(|end| *end <= bounds.metadata_end)
            .ok_or(VerifyError::OutOfRange {
                lba: disk_lba,
                blocks,
                end: bounds.metadata_end,
            })?;

        let first_chunk = disk_lba / CHUNK_SIZE;
        let end_chunk = end.div_ceil(CHUNK_SIZE);
        let user_chunks = bounds.user_chunks();

        let user_end_chunk = end_chunk.min(user_chunks);
        if first_chunk < user_end_chunk {
            self.group
                .metadata()
                .set_bits(first_chunk, user_end_chunk - first_chunk, kind.flag())?;
        }

        let aligned = first_chunk * CHUNK_SIZE;
        self.group.metadata().with_nonpaged_locked(|md| {
            if end_chunk > user_chunks {
                for chunk in first_chunk.max(user_chunks)..end_chunk {
                    if let Some(bits) = md.mdd_verify_bits.get_mut(mdd_slot(chunk - user_chunks)) {
                        *bits |= kind.flag();
                    }
                }
            }
            let checkpoint = md.verify_checkpoints.get(kind);
            if checkpoint == INVALID_LBA || checkpoint > aligned {
                md.verify_checkpoints.set(kind, aligned);
            }
        });

        log_event_with_fields(
            Event::VerifyMarked,
            &[
                ("group", self.group.id()),
                ("kind", kind.as_str()),
                ("lba", disk_lba.to_string().as_str()),
                ("blocks", blocks.to_string().as_str()),
            ],
        );
        Ok(())
    }

    /// Ask for another full pass of `kind` once the current one completes.
    pub fn require_restart(&self, kind: VerifyKind) -> VerifyResult<()> {
        if !matches!(kind, VerifyKind::Error | VerifyKind::IncompleteWrite) {
            return Err(VerifyError::RestartNotSupported(kind));
        }
        self.group
            .metadata()
            .with_nonpaged_locked(|md| md.verify_required |= kind.flag());
        Ok(())
    }

    // ===== Checkpoint advance =====

    /// Move `kind`'s checkpoint from `start` past `block_count` blocks.
    ///
    /// `start` must equal the current checkpoint. Bits are cleared for
    /// every chunk the advance finishes. Returns the new checkpoint.
    pub fn advance_checkpoint(
        &mut self,
        kind: VerifyKind,
        start: u64,
        block_count: u64,
    ) -> VerifyResult<u64> {
        let bounds = self.bounds();
        let metadata = self.group.metadata();

        let (checkpoint, boundary) = metadata.with_nonpaged_locked(|md| {
            let current = md.verify_checkpoints.get(kind);
            if current != start {
                return Err(VerifyError::CheckpointMismatch {
                    kind,
                    checkpoint: current,
                    start,
                });
            }
            if block_count == 0 {
                return Err(VerifyError::NoProgress { kind, start });
            }

            let end = start.saturating_add(block_count);
            let user_chunks = bounds.user_chunks();
            let first_chunk = start / CHUNK_SIZE;
            let done_chunk = end.min(bounds.metadata_end) / CHUNK_SIZE;

            let user_done = done_chunk.min(user_chunks);
            if first_chunk < user_done {
                metadata.clear_bits(first_chunk, user_done - first_chunk, kind.flag())?;
            }
            // The last MDD slot is shared; it clears when the pass ends.
            for chunk in first_chunk.max(user_chunks)..done_chunk {
                let slot = mdd_slot(chunk - user_chunks);
                if slot == MAX_MDD_SLOTS - 1 {
                    continue;
                }
                if let Some(bits) = md.mdd_verify_bits.get_mut(slot) {
                    *bits &= !kind.flag();
                }
            }

            let mut boundary = start < bounds.user_end && end >= bounds.user_end;
            let next = if end >= bounds.metadata_end {
                boundary = true;
                finish_pass(md, kind)
            } else {
                end
            };
            md.verify_checkpoints.set(kind, next);
            Ok((next, boundary))
        })?;

        if checkpoint == INVALID_LBA || (boundary && checkpoint == 0) {
            log_event_with_fields(
                Event::VerifyPassComplete,
                &[
                    ("group", self.group.id()),
                    ("kind", kind.as_str()),
                    ("restart", (checkpoint == 0).to_string().as_str()),
                ],
            );
        }
        self.persist_checkpoints(boundary);
        Ok(checkpoint)
    }

    /// Pass is over if the checkpoint sits past the metadata end (the
    /// capacity shrank back under it).
    fn finish_stale_pass(&mut self, kind: VerifyKind, start: u64) -> VerifyResult<u64> {
        let checkpoint = self.group.metadata().with_nonpaged_locked(|md| {
            let current = md.verify_checkpoints.get(kind);
            if current != start {
                return Err(VerifyError::CheckpointMismatch {
                    kind,
                    checkpoint: current,
                    start,
                });
            }
            let next = finish_pass(md, kind);
            md.verify_checkpoints.set(kind, next);
            Ok(next)
        })?;
        self.persist_checkpoints(true);
        Ok(checkpoint)
    }

    fn persist_checkpoints(&mut self, force: bool) {
        let now = Instant::now();
        let interval = Duration::from_millis(self.settings.persist_interval_ms);
        let due = force
            || self
                .last_persist
                .map_or(true, |last| now.duration_since(last) >= interval);
        if !due {
            return;
        }

        match self.group.metadata().write_persist() {
            Ok(()) => {
                self.last_persist = Some(now);
                log_event_with_fields(Event::CheckpointPersisted, &[("group", self.group.id())]);
            }
            Err(e) => log_event_with_fields(
                Event::CheckpointPersistFailed,
                &[("group", self.group.id()), ("error", e.to_string().as_str())],
            ),
        }
    }

    // ===== Cycle =====

    fn chunk_marked(
        &self,
        kind: VerifyKind,
        chunk: u64,
        user_chunks: u64,
        md: &NonPagedMetadata,
    ) -> VerifyResult<bool> {
        if chunk < user_chunks {
            Ok(self.group.metadata().chunk_bits(chunk)? & kind.flag() != 0)
        } else {
            Ok(md
                .mdd_verify_bits
                .get(mdd_slot(chunk - user_chunks))
                .map_or(false, |bits| bits & kind.flag() != 0))
        }
    }

    /// Run one verify cycle of `kind` at its checkpoint.
    pub fn run_one_cycle(
        &mut self,
        kind: VerifyKind,
        transport: &mut dyn BlockTransport,
        upstream: &mut dyn UpstreamEvents,
    ) -> VerifyResult<CycleOutcome> {
        self.retry_deferred_report(upstream);

        let bounds = self.bounds();
        let md = self.group.metadata().nonpaged_snapshot();
        let start = md.verify_checkpoints.get(kind);
        if start == INVALID_LBA {
            return Ok(CycleOutcome::NothingToDo);
        }
        if start >= bounds.metadata_end {
            self.finish_stale_pass(kind, start)?;
            return Ok(CycleOutcome::Skipped { start, blocks: 0 });
        }

        let region_end = if start < bounds.user_end {
            bounds.user_end
        } else {
            bounds.metadata_end
        };
        let user_chunks = bounds.user_chunks();
        let first = start / CHUNK_SIZE;
        let last = region_end.div_ceil(CHUNK_SIZE);
        let marked = self.chunk_marked(kind, first, user_chunks, &md)?;

        let mut run_end = first + 1;
        while run_end < last
            && (!marked || run_end - first < self.settings.chunks_per_cycle)
            && self.chunk_marked(kind, run_end, user_chunks, &md)? == marked
        {
            run_end += 1;
        }
        let mut count = (run_end * CHUNK_SIZE).min(region_end) - start;

        if !marked {
            return self.skip(kind, start, count);
        }

        let mut end_of_extent = false;
        if start < bounds.user_end {
            let dd = bounds.data_disks;
            let response = upstream.request_permit(&PermitRequest {
                kind,
                lba: start * dd,
                block_count: count * dd,
            });
            let unconsumed = response.unconsumed_block_count / dd;
            match response.status {
                PermitStatus::Busy | PermitStatus::Deny => {
                    log_event_with_fields(
                        Event::VerifyPermitBusy,
                        &[("group", self.group.id()), ("kind", kind.as_str())],
                    );
                    return Ok(CycleOutcome::Busy);
                }
                PermitStatus::NoUserData => {
                    if unconsumed == 0 {
                        return Err(VerifyError::NoProgress { kind, start });
                    }
                    return self.skip(kind, start, unconsumed.min(count));
                }
                PermitStatus::Ok if unconsumed > 0 && response.unconsumed_at_start => {
                    return self.skip(kind, start, unconsumed.min(count));
                }
                PermitStatus::Ok => {
                    if unconsumed > 0 {
                        count = count.saturating_sub(unconsumed);
                        if count == 0 {
                            return Err(VerifyError::NoProgress { kind, start });
                        }
                    }
                    end_of_extent = response
                        .extent_end
                        .map_or(false, |extent_end| (start + count) * dd >= extent_end);
                }
            }
        }

        let op = BlockOperation::new(kind.opcode(), start, count);
        self.group.begin_io();
        let completion = transport.issue_block_op(&op);
        self.group.end_io();

        if !completion.is_success() {
            self.metrics.increment_verify_io_failures();
            log_event_with_fields(
                Event::VerifyIoFailed,
                &[
                    ("group", self.group.id()),
                    ("kind", kind.as_str()),
                    ("lba", start.to_string().as_str()),
                    ("blocks", count.to_string().as_str()),
                ],
            );
            return Ok(CycleOutcome::IoFailed {
                start,
                blocks: count,
            });
        }

        self.advance_checkpoint(kind, start, count)?;
        self.metrics.add_verified_blocks(count);
        log_event_with_fields(
            Event::VerifyIoComplete,
            &[
                ("group", self.group.id()),
                ("kind", kind.as_str()),
                ("lba", start.to_string().as_str()),
                ("blocks", count.to_string().as_str()),
            ],
        );

        if start < bounds.user_end && (end_of_extent || completion.has_errors()) {
            let report = VerifyReport {
                kind,
                lba: start * bounds.data_disks,
                block_count: count * bounds.data_disks,
                correctable_errors: completion.correctable_errors,
                uncorrectable_errors: completion.uncorrectable_errors,
                end_of_extent,
            };
            self.send_report(upstream, report);
        }

        Ok(CycleOutcome::Verified {
            start,
            blocks: count,
        })
    }

    fn skip(&mut self, kind: VerifyKind, start: u64, blocks: u64) -> VerifyResult<CycleOutcome> {
        self.advance_checkpoint(kind, start, blocks)?;
        self.metrics.add_skipped_blocks(blocks);
        log_event_with_fields(
            Event::VerifyRangeSkipped,
            &[
                ("group", self.group.id()),
                ("kind", kind.as_str()),
                ("lba", start.to_string().as_str()),
                ("blocks", blocks.to_string().as_str()),
            ],
        );
        Ok(CycleOutcome::Skipped { start, blocks })
    }

    /// Run cycles until nothing is left, upstream is busy, an I/O fails
    /// or `max_cycles` is reached.
    pub fn run_cycles(
        &mut self,
        transport: &mut dyn BlockTransport,
        upstream: &mut dyn UpstreamEvents,
        max_cycles: usize,
    ) -> VerifyResult<Vec<(VerifyKind, CycleOutcome)>> {
        let mut outcomes = Vec::new();
        while outcomes.len() < max_cycles {
            let Some(kind) = self.next_verify() else {
                break;
            };
            let outcome = self.run_one_cycle(kind, transport, upstream)?;
            outcomes.push((kind, outcome));
            if matches!(outcome, CycleOutcome::Busy | CycleOutcome::IoFailed { .. }) {
                break;
            }
        }
        Ok(outcomes)
    }

    // ===== Reports =====

    fn send_report(&mut self, upstream: &mut dyn UpstreamEvents, report: VerifyReport) {
        match upstream.send_verify_report(&report) {
            Ok(()) => {
                self.metrics.increment_reports_sent();
                log_event_with_fields(
                    Event::VerifyReportSent,
                    &[
                        ("group", self.group.id()),
                        ("kind", report.kind.as_str()),
                        ("lba", report.lba.to_string().as_str()),
                        ("correctable", report.correctable_errors.to_string().as_str()),
                        ("uncorrectable", report.uncorrectable_errors.to_string().as_str()),
                    ],
                );
            }
            Err(e) => {
                self.metrics.increment_reports_deferred();
                log_event_with_fields(
                    Event::VerifyReportDeferred,
                    &[("group", self.group.id()), ("error", e.to_string().as_str())],
                );
                self.deferred_report = Some(report);
            }
        }
    }

    fn retry_deferred_report(&mut self, upstream: &mut dyn UpstreamEvents) {
        if let Some(report) = self.deferred_report.take() {
            self.send_report(upstream, report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RaidType;
    use crate::raid_group::{DownstreamEdge, LinkState};
    use crate::transport::{BlockOpcode, SimulatedTransport};
    use crate::verify::ExtentUpstream;

    // 4 data disks: user area is 4 chunks per disk, paged metadata 1 chunk.
    const USER_END: u64 = 8192;
    const METADATA_END: u64 = 8192 + CHUNK_SIZE;

    fn engine() -> VerifyCheckpointEngine {
        engine_with(VerifySettings::default())
    }

    fn engine_with(settings: VerifySettings) -> VerifyCheckpointEngine {
        let group = RaidGroup::new("rg-v", 5, RaidType::Raid5, 128, 8, 8192 * 4).unwrap();
        VerifyCheckpointEngine::new(Arc::new(group), settings, Arc::new(MetricsRegistry::new()))
    }

    #[test]
    fn test_mark_sets_bits_and_lowers_checkpoint() {
        let engine = engine();
        engine.mark_for_verify(CHUNK_SIZE * 2 + 10, 100, VerifyKind::Error).unwrap();
        assert_eq!(engine.checkpoint(VerifyKind::Error), CHUNK_SIZE * 2);

        engine.mark_for_verify(CHUNK_SIZE, 1, VerifyKind::Error).unwrap();
        assert_eq!(engine.checkpoint(VerifyKind::Error), CHUNK_SIZE);

        let store = engine.group.metadata();
        assert_eq!(store.chunk_bits(1).unwrap(), VerifyKind::Error.flag());
        assert_eq!(store.chunk_bits(2).unwrap(), VerifyKind::Error.flag());
        assert_eq!(store.chunk_bits(3).unwrap(), 0);
    }

    #[test]
    fn test_mark_metadata_area_uses_mdd_bits() {
        let engine = engine();
        engine.mark_for_verify(USER_END, CHUNK_SIZE, VerifyKind::System).unwrap();

        let md = engine.group.metadata().nonpaged_snapshot();
        assert!(md.mdd_pending(VerifyKind::System));
        assert_eq!(md.verify_checkpoints.get(VerifyKind::System), USER_END);
        assert_eq!(
            engine.get_next_verify_type(VerifyRegion::Metadata),
            Some(VerifyKind::System)
        );
        assert_eq!(engine.get_next_verify_type(VerifyRegion::User), None);
    }

    #[test]
    fn test_mark_out_of_range() {
        let engine = engine();
        assert!(matches!(
            engine.mark_for_verify(METADATA_END - 1, 2, VerifyKind::ReadOnly),
            Err(VerifyError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_advance_requires_continuity() {
        let mut engine = engine();
        engine.mark_for_verify(0, USER_END, VerifyKind::ReadWrite).unwrap();

        assert_eq!(
            engine.advance_checkpoint(VerifyKind::ReadWrite, 0, CHUNK_SIZE),
            Ok(CHUNK_SIZE)
        );
        assert_eq!(
            engine.advance_checkpoint(VerifyKind::ReadWrite, 0, CHUNK_SIZE),
            Err(VerifyError::CheckpointMismatch {
                kind: VerifyKind::ReadWrite,
                checkpoint: CHUNK_SIZE,
                start: 0,
            })
        );
        assert_eq!(
            engine.advance_checkpoint(VerifyKind::ReadWrite, CHUNK_SIZE, 0),
            Err(VerifyError::NoProgress {
                kind: VerifyKind::ReadWrite,
                start: CHUNK_SIZE
            })
        );
        assert_eq!(engine.group.metadata().chunk_bits(0).unwrap(), 0);
        assert_ne!(engine.group.metadata().chunk_bits(1).unwrap(), 0);
    }

    #[test]
    fn test_partial_chunk_advance_keeps_bit() {
        let mut engine = engine();
        engine.mark_for_verify(0, CHUNK_SIZE, VerifyKind::ReadOnly).unwrap();
        engine.advance_checkpoint(VerifyKind::ReadOnly, 0, 1000).unwrap();
        assert_ne!(engine.group.metadata().chunk_bits(0).unwrap(), 0);

        engine
            .advance_checkpoint(VerifyKind::ReadOnly, 1000, CHUNK_SIZE - 1000)
            .unwrap();
        assert_eq!(engine.group.metadata().chunk_bits(0).unwrap(), 0);
    }

    #[test]
    fn test_pass_end_invalidates_or_restarts() {
        let mut engine = engine();
        engine.mark_for_verify(USER_END, CHUNK_SIZE, VerifyKind::ReadOnly).unwrap();
        assert_eq!(
            engine.advance_checkpoint(VerifyKind::ReadOnly, USER_END, CHUNK_SIZE),
            Ok(INVALID_LBA)
        );

        engine.mark_for_verify(USER_END, CHUNK_SIZE, VerifyKind::Error).unwrap();
        engine.require_restart(VerifyKind::Error).unwrap();
        assert_eq!(
            engine.advance_checkpoint(VerifyKind::Error, USER_END, CHUNK_SIZE),
            Ok(0)
        );
        let md = engine.group.metadata().nonpaged_snapshot();
        assert!(!md.is_verify_required(VerifyKind::Error));
        assert!(!md.mdd_pending(VerifyKind::Error));
        // boundary advances are persisted
        assert_eq!(engine.group.metadata().read_persisted().unwrap(), md);
    }

    #[test]
    fn test_persist_interval_throttles_mid_pass_advances() {
        let mut engine = engine_with(VerifySettings {
            persist_interval_ms: u64::MAX,
            ..VerifySettings::default()
        });
        engine.mark_for_verify(0, USER_END, VerifyKind::ReadWrite).unwrap();
        let persisted = |engine: &VerifyCheckpointEngine| {
            engine
                .group
                .metadata()
                .read_persisted()
                .unwrap()
                .verify_checkpoints
                .get(VerifyKind::ReadWrite)
        };

        // The first advance always writes
        engine.advance_checkpoint(VerifyKind::ReadWrite, 0, CHUNK_SIZE).unwrap();
        assert_eq!(persisted(&engine), CHUNK_SIZE);

        engine
            .advance_checkpoint(VerifyKind::ReadWrite, CHUNK_SIZE, CHUNK_SIZE)
            .unwrap();
        assert_eq!(persisted(&engine), CHUNK_SIZE);

        // Crossing the end of the user area is always written
        engine
            .advance_checkpoint(VerifyKind::ReadWrite, CHUNK_SIZE * 2, USER_END - CHUNK_SIZE * 2)
            .unwrap();
        assert_eq!(persisted(&engine), USER_END);
    }

    #[test]
    fn test_zero_persist_interval_writes_every_advance() {
        let mut engine = engine_with(VerifySettings {
            persist_interval_ms: 0,
            ..VerifySettings::default()
        });
        engine.mark_for_verify(0, USER_END, VerifyKind::ReadWrite).unwrap();
        for step in 0..3 {
            engine
                .advance_checkpoint(VerifyKind::ReadWrite, step * CHUNK_SIZE, CHUNK_SIZE)
                .unwrap();
            let md = engine.group.metadata().read_persisted().unwrap();
            assert_eq!(
                md.verify_checkpoints.get(VerifyKind::ReadWrite),
                (step + 1) * CHUNK_SIZE
            );
        }
    }

    #[test]
    fn test_restart_only_for_error_kinds() {
        let engine = engine();
        assert_eq!(
            engine.require_restart(VerifyKind::ReadOnly),
            Err(VerifyError::RestartNotSupported(VerifyKind::ReadOnly))
        );
        assert!(engine.require_restart(VerifyKind::IncompleteWrite).is_ok());
    }

    #[test]
    fn test_priority_filtered_by_enabled() {
        let mut engine = engine();
        for kind in [VerifyKind::ReadOnly, VerifyKind::System, VerifyKind::Error] {
            engine.mark_for_verify(0, CHUNK_SIZE, kind).unwrap();
        }
        assert_eq!(
            engine.get_next_verify_type(VerifyRegion::User),
            Some(VerifyKind::Error)
        );
        engine.set_enabled(VerifyKind::Error, false);
        assert_eq!(
            engine.get_next_verify_type(VerifyRegion::User),
            Some(VerifyKind::System)
        );
    }

    #[test]
    fn test_cycle_skips_unmarked_run() {
        let mut engine = engine();
        engine.mark_for_verify(CHUNK_SIZE * 3, CHUNK_SIZE, VerifyKind::ReadWrite).unwrap();
        // pull the checkpoint back over unmarked chunks
        engine
            .group
            .metadata()
            .with_nonpaged_locked(|md| md.verify_checkpoints.set(VerifyKind::ReadWrite, 0));

        let mut transport = SimulatedTransport::new();
        let mut upstream = ExtentUpstream::fully_consumed();
        let outcome = engine
            .run_one_cycle(VerifyKind::ReadWrite, &mut transport, &mut upstream)
            .unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Skipped {
                start: 0,
                blocks: CHUNK_SIZE * 3
            }
        );
        assert!(transport.issued().is_empty());
        assert!(upstream.permits().is_empty());
    }

    #[test]
    fn test_cycle_verifies_marked_run() {
        let mut engine = engine_with(VerifySettings {
            chunks_per_cycle: 2,
            ..VerifySettings::default()
        });
        engine.mark_for_verify(0, USER_END, VerifyKind::ReadWrite).unwrap();

        let mut transport = SimulatedTransport::new();
        let mut upstream = ExtentUpstream::fully_consumed();
        let outcome = engine
            .run_one_cycle(VerifyKind::ReadWrite, &mut transport, &mut upstream)
            .unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Verified {
                start: 0,
                blocks: CHUNK_SIZE * 2
            }
        );
        assert_eq!(
            transport.issued(),
            &[BlockOperation::new(
                BlockOpcode::InitiateUserVerify,
                0,
                CHUNK_SIZE * 2
            )]
        );
        // permit asked in raid LBAs
        assert_eq!(upstream.permits()[0].block_count, CHUNK_SIZE * 2 * 4);
        assert_eq!(engine.checkpoint(VerifyKind::ReadWrite), CHUNK_SIZE * 2);
    }

    #[test]
    fn test_io_failure_leaves_checkpoint() {
        let mut engine = engine();
        engine.mark_for_verify(0, CHUNK_SIZE, VerifyKind::Error).unwrap();

        let mut transport = SimulatedTransport::new();
        transport.fail(BlockOpcode::InitiateErrorVerify, None);
        let mut upstream = ExtentUpstream::fully_consumed();
        let outcome = engine
            .run_one_cycle(VerifyKind::Error, &mut transport, &mut upstream)
            .unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::IoFailed {
                start: 0,
                blocks: CHUNK_SIZE
            }
        );
        assert_eq!(engine.checkpoint(VerifyKind::Error), 0);
        assert_eq!(engine.metrics.snapshot().verify_io_failures, 1);
    }

    #[test]
    fn test_busy_makes_no_progress() {
        let mut engine = engine();
        engine.mark_for_verify(0, CHUNK_SIZE, VerifyKind::ReadOnly).unwrap();
        let mut transport = SimulatedTransport::new();
        let mut upstream = ExtentUpstream::fully_consumed();
        upstream.set_busy(true);

        assert_eq!(
            engine.run_one_cycle(VerifyKind::ReadOnly, &mut transport, &mut upstream),
            Ok(CycleOutcome::Busy)
        );
        assert_eq!(engine.checkpoint(VerifyKind::ReadOnly), 0);
        assert!(transport.issued().is_empty());
    }

    #[test]
    fn test_deferred_report_is_retried() {
        let mut engine = engine_with(VerifySettings {
            chunks_per_cycle: 1,
            ..VerifySettings::default()
        });
        engine.mark_for_verify(0, CHUNK_SIZE * 2, VerifyKind::Error).unwrap();

        let mut transport = SimulatedTransport::new();
        transport.media_error(10, 1, 0);
        let mut upstream = ExtentUpstream::fully_consumed();
        upstream.fail_reports(1);

        engine
            .run_one_cycle(VerifyKind::Error, &mut transport, &mut upstream)
            .unwrap();
        assert!(upstream.reports().is_empty());
        assert!(engine.deferred_report().is_some());

        engine
            .run_one_cycle(VerifyKind::Error, &mut transport, &mut upstream)
            .unwrap();
        assert!(engine.deferred_report().is_none());
        assert_eq!(upstream.reports().len(), 1);
        assert_eq!(upstream.reports()[0].correctable_errors, 1);
    }

    #[test]
    fn test_verify_not_needed_when_degraded() {
        let engine = engine();
        assert!(!engine.is_verify_needed(GroupHealth::Optimal));

        engine.mark_for_verify(0, 1, VerifyKind::ReadOnly).unwrap();
        assert!(engine.is_verify_needed(GroupHealth::Optimal));

        engine.group.set_edge(0, DownstreamEdge::new(LinkState::Disabled));
        assert!(!engine.is_verify_needed(engine.group.health()));
    }
}

//! Raid group object
//!
//! Owns the geometry (behind the geometry lock), the metadata store
//! (behind the NP lock), downstream edge states and rebuild bookkeeping.
//!
//! - `CapacityMutator`: applies a new exported capacity
//! - `PagedMetadataRelocator`: rebuilds paged metadata after a change
//! - `EdgeHealthEvaluator`: classifies downstream health

mod capacity;
mod errors;
mod health;
mod relocate;

pub use capacity::CapacityMutator;
pub use errors::{CapacityError, CapacityResult, RelocationError, RelocationResult};
pub use health::{DownstreamEdge, EdgeCounts, EdgeHealthEvaluator, GroupHealth, LinkState};
pub use relocate::{PagedMetadataRelocator, RelocationPlan, RelocationStep};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::geometry::{
    MetadataPositionCalculator, MetadataPositions, RaidGeometry, RaidType, CHUNK_SIZE, INVALID_LBA,
};
use crate::metadata::MetadataStore;
use crate::observability::{log_event_with_fields, Event};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything protected by the geometry lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLayout {
    pub geometry: RaidGeometry,
    /// Capacity visible to clients
    pub exported_capacity: u64,
    /// Metadata element: paged metadata and journal placement
    pub positions: MetadataPositions,
    pub total_stripes: u64,
    /// Stripes covering paged metadata
    pub private_stripes: u64,
    /// Bumped every time stripe lock parameters are recomputed
    pub stripe_lock_generation: u64,
}

impl GroupLayout {
    pub fn data_disks(&self) -> u32 {
        self.geometry.data_disks()
    }

    /// Per-disk end of the user area, where paged metadata starts.
    pub fn user_disk_capacity(&self) -> u64 {
        self.positions.paged_metadata_lba / u64::from(self.data_disks())
    }

    /// Per-disk end of paged metadata.
    pub fn metadata_disk_end(&self) -> u64 {
        self.positions.raid_capacity / u64::from(self.data_disks())
    }

    pub(crate) fn user_chunks_for(positions: &MetadataPositions, data_disks: u32) -> u64 {
        (positions.paged_metadata_lba / u64::from(data_disks.max(1))).div_ceil(CHUNK_SIZE)
    }
}

pub struct RaidGroup {
    id: String,
    layout: Mutex<GroupLayout>,
    metadata: MetadataStore,
    edges: Mutex<Vec<DownstreamEdge>>,
    blocks_rebuilt: Mutex<Vec<u64>>,
    in_flight_io: AtomicU64,
}

impl RaidGroup {
    pub fn new(
        id: impl Into<String>,
        width: u32,
        raid_type: RaidType,
        element_size: u32,
        elements_per_parity: u32,
        exported_capacity: u64,
    ) -> CapacityResult<Self> {
        let geometry = RaidGeometry::new(width, raid_type, element_size, elements_per_parity)?;
        let mut layout = GroupLayout {
            geometry,
            exported_capacity: 0,
            positions: MetadataPositionCalculator::compute(
                0,
                raid_type,
                raid_type.data_disks(width),
            )?,
            total_stripes: 0,
            private_stripes: 0,
            stripe_lock_generation: 0,
        };
        let positions = CapacityMutator::apply_locked(&mut layout, exported_capacity)?;
        // Creation is not a change.
        layout.stripe_lock_generation = 0;

        let user_chunks = GroupLayout::user_chunks_for(&positions, layout.data_disks());
        Ok(Self {
            id: id.into(),
            layout: Mutex::new(layout),
            metadata: MetadataStore::new(width, user_chunks),
            edges: Mutex::new(vec![DownstreamEdge::enabled(); width as usize]),
            blocks_rebuilt: Mutex::new(vec![0; width as usize]),
            in_flight_io: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run `f` under the geometry lock.
    pub fn with_layout_locked<R>(&self, f: impl FnOnce(&mut GroupLayout) -> R) -> R {
        let mut guard = lock(&self.layout);
        f(&mut guard)
    }

    pub fn layout_snapshot(&self) -> GroupLayout {
        lock(&self.layout).clone()
    }

    pub fn exported_capacity(&self) -> u64 {
        lock(&self.layout).exported_capacity
    }

    pub fn data_disks(&self) -> u32 {
        lock(&self.layout).data_disks()
    }

    pub fn width(&self) -> u32 {
        lock(&self.layout).geometry.width()
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    // ===== Downstream edges =====

    pub fn set_edge(&self, position: usize, edge: DownstreamEdge) {
        if let Some(slot) = lock(&self.edges).get_mut(position) {
            *slot = edge;
        }
    }

    pub fn edges(&self) -> Vec<DownstreamEdge> {
        lock(&self.edges).clone()
    }

    pub fn health(&self) -> GroupHealth {
        let parity = lock(&self.layout).geometry.parity_disks();
        EdgeHealthEvaluator::evaluate(&lock(&self.edges), parity)
    }

    // ===== In-flight I/O =====

    pub fn begin_io(&self) {
        self.in_flight_io.fetch_add(1, Ordering::Relaxed);
    }

    pub fn end_io(&self) {
        let _ = self
            .in_flight_io
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn in_flight_io(&self) -> u64 {
        self.in_flight_io.load(Ordering::Relaxed)
    }

    // ===== Rebuild bookkeeping =====

    pub fn record_rebuild_progress(&self, position: usize, blocks: u64) {
        if let Some(slot) = lock(&self.blocks_rebuilt).get_mut(position) {
            *slot = blocks;
        }
    }

    pub fn blocks_rebuilt(&self, position: usize) -> u64 {
        lock(&self.blocks_rebuilt).get(position).copied().unwrap_or(0)
    }

    /// Drop rebuild progress that only the dead peer could vouch for.
    ///
    /// Each rebuilding position falls back to its persisted checkpoint, or
    /// to 0 when the checkpoint is past the user area.
    pub fn peer_died_cleanup(&self) {
        let checkpoints = self.metadata.nonpaged_snapshot().rebuild_checkpoints;
        let user_disk_capacity = self.layout_snapshot().user_disk_capacity();

        let mut rebuilt = lock(&self.blocks_rebuilt);
        for (position, checkpoint) in checkpoints.into_iter().enumerate() {
            if checkpoint == INVALID_LBA {
                continue;
            }
            let Some(slot) = rebuilt.get_mut(position) else {
                continue;
            };
            *slot = if checkpoint <= user_disk_capacity {
                checkpoint
            } else {
                0
            };
            log_event_with_fields(
                Event::PeerDiedCleanup,
                &[
                    ("group", self.id.as_str()),
                    ("position", position.to_string().as_str()),
                    ("blocks_rebuilt", slot.to_string().as_str()),
                ],
            );
        }
    }
}

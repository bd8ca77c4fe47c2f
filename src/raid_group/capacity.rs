//! Capacity mutation
//!
//! The single place exported capacity, geometry, metadata element and
//! stripe lock parameters change. Everything happens under the geometry
//! lock, so observers see either the old layout or the new one.

use super::errors::CapacityResult;
use super::{GroupLayout, RaidGroup};
use crate::geometry::{MetadataPositionCalculator, MetadataPositions};

pub struct CapacityMutator;

impl CapacityMutator {
    /// Apply `capacity` as the group's exported capacity.
    pub fn apply(group: &RaidGroup, capacity: u64) -> CapacityResult<MetadataPositions> {
        let positions = group.with_layout_locked(|layout| Self::apply_locked(layout, capacity))?;
        group
            .metadata()
            .resize_paged(GroupLayout::user_chunks_for(&positions, group.data_disks()));
        Ok(positions)
    }

    pub(crate) fn apply_locked(
        layout: &mut GroupLayout,
        capacity: u64,
    ) -> CapacityResult<MetadataPositions> {
        layout.exported_capacity = capacity;

        let geometry = &mut layout.geometry;
        let positions = MetadataPositionCalculator::compute(
            capacity,
            geometry.raid_type(),
            geometry.data_disks(),
        )?;

        let configured_total = positions.exported_capacity + positions.paged_metadata_capacity;
        geometry.set_configuration(
            geometry.width(),
            geometry.raid_type(),
            geometry.element_size(),
            geometry.elements_per_parity(),
            configured_total,
        )?;

        layout.positions = positions;

        let stripes_through = |end_lba: u64| match end_lba {
            0 => 0,
            end => geometry.lock_range(end - 1, 1).stripe_number + 1,
        };
        layout.total_stripes = stripes_through(positions.raid_capacity);
        let user_stripes = stripes_through(positions.paged_metadata_lba);
        layout.private_stripes = layout.total_stripes - user_stripes;

        // Stripe lock hashing depends on the totals above.
        layout.stripe_lock_generation += 1;

        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{RaidType, CHUNK_SIZE};

    fn group() -> RaidGroup {
        RaidGroup::new("rg-test", 5, RaidType::Raid5, 128, 8, 8192 * 4).unwrap()
    }

    #[test]
    fn test_apply_updates_everything() {
        let group = group();
        let before = group.layout_snapshot();

        let positions = CapacityMutator::apply(&group, 8192 * 8).unwrap();
        let after = group.layout_snapshot();

        assert_eq!(after.exported_capacity, 8192 * 8);
        assert_eq!(after.positions, positions);
        assert_eq!(
            after.geometry.configured_capacity(),
            positions.exported_capacity + positions.paged_metadata_capacity
        );
        assert_eq!(after.stripe_lock_generation, before.stripe_lock_generation + 1);
        assert!(after.total_stripes > before.total_stripes);
        // 512 blocks per stripe, paged metadata is one chunk stripe
        assert_eq!(after.private_stripes, 8192 / 512);
        assert_eq!(group.metadata().paged_chunk_count(), 8192 * 8 / 4 / CHUNK_SIZE);
    }

    #[test]
    fn test_apply_keeps_unrounded_exported_capacity() {
        let group = group();
        CapacityMutator::apply(&group, 50000).unwrap();
        let layout = group.layout_snapshot();
        assert_eq!(layout.exported_capacity, 50000);
        assert_eq!(layout.positions.paged_metadata_lba, 57344);
    }

    #[test]
    fn test_apply_is_repeatable() {
        let group = group();
        let a = CapacityMutator::apply(&group, 8192 * 3).unwrap();
        let b = CapacityMutator::apply(&group, 8192 * 3).unwrap();
        assert_eq!(a, b);
    }
}

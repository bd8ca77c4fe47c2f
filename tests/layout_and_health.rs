//! Layout and Health Tests
//!
//! Pure arithmetic and classification that both controllers must agree on
//! without talking to each other:
//! - capacity rounding is idempotent and chunk stripe aligned
//! - metadata positions follow from the rounded capacity alone
//! - applying a capacity moves geometry and stripe lock state together
//! - edge states classify into the same group health on every SP

use raidgroup::geometry::{
    round_capacity, LayoutError, MetadataPositionCalculator, RaidType, CHUNK_SIZE,
    WRITE_LOG_BLOCKS_PER_DISK,
};
use raidgroup::raid_group::{
    CapacityMutator, DownstreamEdge, EdgeHealthEvaluator, GroupHealth, LinkState, RaidGroup,
};

fn edges(states: &[LinkState]) -> Vec<DownstreamEdge> {
    states.iter().map(|state| DownstreamEdge::new(*state)).collect()
}

// =============================================================================
// Capacity Rounding
// =============================================================================

/// Rounding twice gives the same answer as rounding once, for every width.
#[test]
fn test_rounding_is_idempotent_and_aligned() {
    let requests = [0u64, 1, 2047, 2048, 8191, 8192, 100_000, 100_001, 1 << 32, 987_654_321];
    for data_disks in 1..=16u32 {
        let stripe = CHUNK_SIZE * u64::from(data_disks);
        for requested in requests {
            let rounded = round_capacity(requested, data_disks).unwrap();
            assert_eq!(rounded % stripe, 0, "{} on {} disks", requested, data_disks);
            assert!(rounded >= requested);
            assert!(rounded - requested < stripe);
            assert_eq!(round_capacity(rounded, data_disks).unwrap(), rounded);
        }
    }
}

/// Rounded capacity is the ceiling of the request in chunk stripes.
#[test]
fn test_rounding_matches_ceiling_division() {
    let data_disks = 4u32;
    let stripe = CHUNK_SIZE * 4;
    for requested in [100_000u64, 100_001, 106_496, 106_497, 200_000, 60_000] {
        let expected = requested.div_ceil(stripe) * stripe;
        assert_eq!(round_capacity(requested, data_disks).unwrap(), expected);
    }
    assert_eq!(round_capacity(100_001, data_disks).unwrap(), 106_496);
    assert_eq!(round_capacity(106_497, data_disks).unwrap(), 114_688);
}

/// A request near the top of the address space is an error, not a wrap.
#[test]
fn test_rounding_overflow_is_reported() {
    let err = round_capacity(u64::MAX - 5, 3).unwrap_err();
    assert!(matches!(err, LayoutError::Overflow { data_disks: 3, .. }));
}

// =============================================================================
// Metadata Positions
// =============================================================================

/// Paged metadata starts right after user space and the journal after that.
#[test]
fn test_positions_are_contiguous() {
    for (raid_type, data_disks) in [
        (RaidType::Raid5, 4u32),
        (RaidType::Raid6, 6),
        (RaidType::Raid3, 4),
        (RaidType::Raid0, 3),
        (RaidType::Raid10, 2),
        (RaidType::Raid1, 1),
    ] {
        let positions = MetadataPositionCalculator::compute(300_000, raid_type, data_disks).unwrap();
        let disks = u64::from(data_disks);

        assert_eq!(positions.paged_metadata_lba, positions.exported_capacity);
        assert_eq!(
            positions.raid_capacity,
            positions.paged_metadata_lba + positions.paged_metadata_capacity
        );
        assert_eq!(
            positions.imported_capacity,
            positions.raid_capacity + positions.journal_capacity
        );
        assert_eq!(positions.journal_write_log_pba, positions.raid_capacity / disks);
        assert_eq!(positions.paged_metadata_capacity % (CHUNK_SIZE * disks), 0);

        let expected_journal = if raid_type.has_write_log() {
            WRITE_LOG_BLOCKS_PER_DISK * disks
        } else {
            0
        };
        assert_eq!(positions.journal_capacity, expected_journal, "{}", raid_type);
    }
}

/// Only the rounded capacity matters to the layout.
#[test]
fn test_positions_depend_on_rounded_capacity() {
    let a = MetadataPositionCalculator::compute(100_001, RaidType::Raid5, 4).unwrap();
    let b = MetadataPositionCalculator::compute(106_496, RaidType::Raid5, 4).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.exported_capacity, 106_496);
}

#[test]
fn test_positions_reject_zero_data_disks() {
    let err = MetadataPositionCalculator::compute(4096, RaidType::Raid0, 0).unwrap_err();
    assert_eq!(err, LayoutError::NoDataDisks);
}

// =============================================================================
// Capacity Mutation
// =============================================================================

/// Geometry, stripe counts and paged metadata all move to the new capacity.
#[test]
fn test_apply_moves_layout_together() {
    let group = RaidGroup::new("rg-0", 5, RaidType::Raid5, 128, 8, 100_000).unwrap();
    let before = group.layout_snapshot();
    assert_eq!(before.stripe_lock_generation, 0);

    let positions = CapacityMutator::apply(&group, 204_800).unwrap();
    let after = group.layout_snapshot();

    assert_eq!(after.exported_capacity, 204_800);
    assert_eq!(after.positions, positions);
    assert_eq!(positions.paged_metadata_lba, 204_800);
    assert_eq!(positions.paged_metadata_capacity, 8192);
    assert_eq!(positions.raid_capacity, 212_992);
    assert_eq!(after.geometry.configured_capacity(), 212_992);

    // 512 host blocks per stripe
    assert_eq!(after.total_stripes, 416);
    assert_eq!(after.private_stripes, 16);
    assert_eq!(after.stripe_lock_generation, before.stripe_lock_generation + 1);

    // 51200 blocks per disk of user space is 25 chunks
    assert_eq!(group.metadata().paged_chunk_count(), 25);
}

/// Shrinking back restores the original layout apart from the generation.
#[test]
fn test_apply_back_restores_layout() {
    let group = RaidGroup::new("rg-0", 5, RaidType::Raid5, 128, 8, 106_496).unwrap();
    let original = group.layout_snapshot();

    CapacityMutator::apply(&group, 204_800).unwrap();
    CapacityMutator::apply(&group, 106_496).unwrap();
    let restored = group.layout_snapshot();

    assert_eq!(restored.exported_capacity, original.exported_capacity);
    assert_eq!(restored.positions, original.positions);
    assert_eq!(restored.total_stripes, original.total_stripes);
    assert_eq!(restored.private_stripes, original.private_stripes);
    assert_eq!(restored.stripe_lock_generation, 2);
}

/// Chunk bits below the old end survive an expansion.
#[test]
fn test_apply_preserves_marked_chunks() {
    let group = RaidGroup::new("rg-0", 5, RaidType::Raid5, 128, 8, 8192 * 4).unwrap();
    group.metadata().set_bits(2, 1, 0b0000_0100).unwrap();

    CapacityMutator::apply(&group, 8192 * 8).unwrap();

    assert_eq!(group.metadata().paged_chunk_count(), 8);
    assert_eq!(group.metadata().chunk_bits(2).unwrap(), 0b0000_0100);
    assert_eq!(group.metadata().chunk_bits(7).unwrap(), 0);
}

// =============================================================================
// Edge Health
// =============================================================================

/// RAID5 survives one missing disk and breaks on the second broken one.
#[test]
fn test_raid5_health() {
    let mut states = [LinkState::Enabled; 5];
    assert_eq!(
        EdgeHealthEvaluator::evaluate(&edges(&states), 1),
        GroupHealth::Optimal
    );

    states[2] = LinkState::Disabled;
    assert_eq!(
        EdgeHealthEvaluator::evaluate(&edges(&states), 1),
        GroupHealth::Degraded
    );

    let states = [
        LinkState::Broken,
        LinkState::Broken,
        LinkState::Enabled,
        LinkState::Enabled,
        LinkState::Enabled,
    ];
    assert_eq!(
        EdgeHealthEvaluator::evaluate(&edges(&states), 1),
        GroupHealth::Broken
    );
}

#[test]
fn test_raid6_tolerates_two() {
    let mut states = [LinkState::Enabled; 6];
    states[0] = LinkState::Broken;
    states[4] = LinkState::Gone;
    assert_eq!(
        EdgeHealthEvaluator::evaluate(&edges(&states), 2),
        GroupHealth::Degraded
    );

    states[5] = LinkState::Broken;
    assert_eq!(
        EdgeHealthEvaluator::evaluate(&edges(&states), 2),
        GroupHealth::Broken
    );
}

/// Striping without redundancy has no degraded state.
#[test]
fn test_raid0_has_no_degraded_state() {
    let states = [
        LinkState::Enabled,
        LinkState::Disabled,
        LinkState::Enabled,
        LinkState::Enabled,
    ];
    assert_eq!(
        EdgeHealthEvaluator::evaluate(&edges(&states), 0),
        GroupHealth::Disabled
    );
}

/// Group health uses the parity count of its own geometry.
#[test]
fn test_group_health_follows_edges() {
    let group = RaidGroup::new("rg-0", 6, RaidType::Raid6, 128, 8, 100_000).unwrap();
    assert_eq!(group.health(), GroupHealth::Optimal);

    group.set_edge(1, DownstreamEdge::new(LinkState::Disabled));
    group.set_edge(3, DownstreamEdge::new(LinkState::Invalid));
    assert_eq!(group.health(), GroupHealth::Degraded);

    let mut timing_out = DownstreamEdge::enabled();
    timing_out.timeout_errors = true;
    group.set_edge(5, timing_out);
    assert_eq!(group.health(), GroupHealth::Disabled);

    // Out of range positions are ignored
    group.set_edge(42, DownstreamEdge::new(LinkState::Broken));
    assert_eq!(group.edges().len(), 6);
}

//! Raid type and raid geometry
//!
//! The geometry only knows about disks, elements and stripes. It has no
//! notion of metadata; the metadata element is kept by the raid group.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::GeometryConfigError;

/// Raid layouts supported by a raid group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidType {
    /// Striper, no redundancy
    Raid0,
    /// Mirror (2 or 3 way)
    Raid1,
    /// Striped mirrors
    Raid10,
    /// Dedicated parity
    Raid3,
    /// Rotating single parity
    Raid5,
    /// Rotating double parity
    Raid6,
}

impl RaidType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raid0 => "raid0",
            Self::Raid1 => "raid1",
            Self::Raid10 => "raid10",
            Self::Raid3 => "raid3",
            Self::Raid5 => "raid5",
            Self::Raid6 => "raid6",
        }
    }

    /// Parity types carry a write log (journal) region after paged metadata.
    pub fn has_write_log(&self) -> bool {
        matches!(self, Self::Raid3 | Self::Raid5 | Self::Raid6)
    }

    /// Number of disks holding user data for a group of `width` disks.
    pub fn data_disks(&self, width: u32) -> u32 {
        match self {
            Self::Raid0 => width,
            Self::Raid1 => 1,
            Self::Raid10 => width / 2,
            Self::Raid3 | Self::Raid5 => width.saturating_sub(1),
            Self::Raid6 => width.saturating_sub(2),
        }
    }

    /// Number of redundant positions, i.e. how many positions may be lost.
    pub fn parity_disks(&self, width: u32) -> u32 {
        width.saturating_sub(self.data_disks(width))
    }

    /// Check that `width` is a legal disk count for this raid type.
    pub fn validate_width(&self, width: u32) -> Result<(), GeometryConfigError> {
        let ok = match self {
            Self::Raid0 => width >= 1,
            Self::Raid1 => (2..=3).contains(&width),
            Self::Raid10 => width >= 2 && width % 2 == 0,
            Self::Raid3 | Self::Raid5 => width >= 3,
            Self::Raid6 => width >= 4,
        };
        if ok {
            Ok(())
        } else {
            Err(GeometryConfigError::InvalidWidth {
                raid_type: *self,
                width,
            })
        }
    }
}

impl fmt::Display for RaidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stripe range covered by a block range, as used by the stripe lock service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRange {
    pub stripe_number: u64,
    pub stripe_count: u64,
}

/// Raid geometry of a group.
///
/// `configured_capacity` is the total raid-addressable capacity: exported
/// user space plus paged metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaidGeometry {
    width: u32,
    raid_type: RaidType,
    element_size: u32,
    elements_per_parity: u32,
    configured_capacity: u64,
}

impl RaidGeometry {
    /// Create a geometry with no capacity configured yet.
    pub fn new(
        width: u32,
        raid_type: RaidType,
        element_size: u32,
        elements_per_parity: u32,
    ) -> Result<Self, GeometryConfigError> {
        let mut geometry = Self {
            width,
            raid_type,
            element_size,
            elements_per_parity,
            configured_capacity: 0,
        };
        geometry.set_configuration(width, raid_type, element_size, elements_per_parity, 0)?;
        Ok(geometry)
    }

    /// Re-derive the geometry for a new configured capacity.
    ///
    /// The geometry is left untouched when the configuration is rejected.
    pub fn set_configuration(
        &mut self,
        width: u32,
        raid_type: RaidType,
        element_size: u32,
        elements_per_parity: u32,
        configured_capacity: u64,
    ) -> Result<(), GeometryConfigError> {
        raid_type.validate_width(width)?;
        if element_size == 0 {
            return Err(GeometryConfigError::ZeroElementSize);
        }
        if raid_type.has_write_log() && elements_per_parity == 0 {
            return Err(GeometryConfigError::ZeroElementsPerParity(raid_type));
        }
        let data_disks = raid_type.data_disks(width);
        if configured_capacity % u64::from(data_disks) != 0 {
            return Err(GeometryConfigError::UnalignedCapacity {
                capacity: configured_capacity,
                data_disks,
            });
        }

        self.width = width;
        self.raid_type = raid_type;
        self.element_size = element_size;
        self.elements_per_parity = elements_per_parity;
        self.configured_capacity = configured_capacity;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn raid_type(&self) -> RaidType {
        self.raid_type
    }

    pub fn element_size(&self) -> u32 {
        self.element_size
    }

    pub fn elements_per_parity(&self) -> u32 {
        self.elements_per_parity
    }

    pub fn configured_capacity(&self) -> u64 {
        self.configured_capacity
    }

    pub fn data_disks(&self) -> u32 {
        self.raid_type.data_disks(self.width)
    }

    pub fn parity_disks(&self) -> u32 {
        self.raid_type.parity_disks(self.width)
    }

    /// Host blocks in one full stripe.
    pub fn blocks_per_stripe(&self) -> u64 {
        u64::from(self.element_size) * u64::from(self.data_disks())
    }

    /// Stripes touched by `blocks` host blocks starting at `lba`.
    pub fn lock_range(&self, lba: u64, blocks: u64) -> LockRange {
        let per_stripe = self.blocks_per_stripe().max(1);
        let first = lba / per_stripe;
        let last = lba.saturating_add(blocks.max(1) - 1) / per_stripe;
        LockRange {
            stripe_number: first,
            stripe_count: last - first + 1,
        }
    }
}

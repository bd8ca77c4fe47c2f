//! Raid group metadata
//!
//! - Non-paged: verify checkpoints, metadata-of-metadata bits, rebuild
//!   checkpoints. Protected by the NP lock and persisted as a checksummed
//!   record.
//! - Paged: per-chunk verify bits for the user area.

mod errors;
mod nonpaged;
mod paged;
mod store;

pub use errors::{MetadataError, MetadataResult};
pub use nonpaged::{NonPagedMetadata, MAX_MDD_SLOTS};
pub use paged::PagedChunkMap;
pub use store::MetadataStore;

//! Cluster memory shared with the peer controller by message passing

mod flags;
mod link;

pub use flags::ClusterFlags;
pub use link::{link_pair, ClusterLink, ClusterMemory, PeerNotification};

//! Metrics registry
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; a snapshot is not a consistent cut

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    capacity_requests: AtomicU64,
    capacity_requests_noop: AtomicU64,
    capacity_requests_rejected: AtomicU64,
    episodes_committed: AtomicU64,
    episodes_rolled_back: AtomicU64,
    relocation_ios: AtomicU64,
    verify_ios: AtomicU64,
    /// Blocks covered by successful verify I/O
    blocks_verified: AtomicU64,
    /// Blocks the checkpoint moved past without I/O
    blocks_skipped: AtomicU64,
    verify_io_failures: AtomicU64,
    reports_sent: AtomicU64,
    reports_deferred: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Capacity change

    pub fn increment_capacity_requests(&self) {
        self.capacity_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_capacity_requests_noop(&self) {
        self.capacity_requests_noop.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_capacity_requests_rejected(&self) {
        self.capacity_requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_episodes_committed(&self) {
        self.episodes_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_episodes_rolled_back(&self) {
        self.episodes_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_relocation_ios(&self) {
        self.relocation_ios.fetch_add(1, Ordering::Relaxed);
    }

    // Verify

    pub fn add_verified_blocks(&self, blocks: u64) {
        self.verify_ios.fetch_add(1, Ordering::Relaxed);
        self.blocks_verified.fetch_add(blocks, Ordering::Relaxed);
    }

    pub fn add_skipped_blocks(&self, blocks: u64) {
        self.blocks_skipped.fetch_add(blocks, Ordering::Relaxed);
    }

    pub fn increment_verify_io_failures(&self) {
        self.verify_io_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reports_sent(&self) {
        self.reports_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reports_deferred(&self) {
        self.reports_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            capacity_requests: self.capacity_requests.load(Ordering::Relaxed),
            capacity_requests_noop: self.capacity_requests_noop.load(Ordering::Relaxed),
            capacity_requests_rejected: self.capacity_requests_rejected.load(Ordering::Relaxed),
            episodes_committed: self.episodes_committed.load(Ordering::Relaxed),
            episodes_rolled_back: self.episodes_rolled_back.load(Ordering::Relaxed),
            relocation_ios: self.relocation_ios.load(Ordering::Relaxed),
            verify_ios: self.verify_ios.load(Ordering::Relaxed),
            blocks_verified: self.blocks_verified.load(Ordering::Relaxed),
            blocks_skipped: self.blocks_skipped.load(Ordering::Relaxed),
            verify_io_failures: self.verify_io_failures.load(Ordering::Relaxed),
            reports_sent: self.reports_sent.load(Ordering::Relaxed),
            reports_deferred: self.reports_deferred.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub capacity_requests: u64,
    pub capacity_requests_noop: u64,
    pub capacity_requests_rejected: u64,
    pub episodes_committed: u64,
    pub episodes_rolled_back: u64,
    pub relocation_ios: u64,
    pub verify_ios: u64,
    pub blocks_verified: u64,
    pub blocks_skipped: u64,
    pub verify_io_failures: u64,
    pub reports_sent: u64,
    pub reports_deferred: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_verify_counters() {
        let registry = MetricsRegistry::new();
        registry.add_verified_blocks(2048);
        registry.add_verified_blocks(1024);
        registry.add_skipped_blocks(4096);
        registry.increment_verify_io_failures();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.verify_ios, 2);
        assert_eq!(snapshot.blocks_verified, 3072);
        assert_eq!(snapshot.blocks_skipped, 4096);
        assert_eq!(snapshot.verify_io_failures, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = MetricsRegistry::new();
        registry.increment_episodes_rolled_back();
        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json["episodes_rolled_back"], 1);
        assert_eq!(json["episodes_committed"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        registry.increment_relocation_ios();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().relocation_ios, 800);
    }
}

//! Control-plane counters
//!
//! Counters only, monotonic, reset on process start.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metrics registry containing all operational counters
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    mutations_committed: AtomicU64,
    mutations_rejected: AtomicU64,
    mutations_conflicted: AtomicU64,
    events_propagated: AtomicU64,
    events_reconciled: AtomicU64,
    commands_succeeded: AtomicU64,
    commands_failed: AtomicU64,
    firewall_passes: AtomicU64,
    firewall_failures: AtomicU64,
    resolutions: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_mutations_committed(&self) {
        self.mutations_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_mutations_rejected(&self) {
        self.mutations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_mutations_conflicted(&self) {
        self.mutations_conflicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Add the number of per-node events enqueued for one mutation
    pub fn add_events_propagated(&self, count: u64) {
        self.events_propagated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_events_reconciled(&self) {
        self.events_reconciled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one call-engine command
    pub fn record_command(&self, success: bool) {
        if success {
            self.commands_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the outcome of one firewall regeneration pass
    pub fn record_firewall(&self, success: bool) {
        if success {
            self.firewall_passes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.firewall_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_resolutions(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            mutations_committed: self.mutations_committed.load(Ordering::Relaxed),
            mutations_rejected: self.mutations_rejected.load(Ordering::Relaxed),
            mutations_conflicted: self.mutations_conflicted.load(Ordering::Relaxed),
            events_propagated: self.events_propagated.load(Ordering::Relaxed),
            events_reconciled: self.events_reconciled.load(Ordering::Relaxed),
            commands_succeeded: self.commands_succeeded.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            firewall_passes: self.firewall_passes.load(Ordering::Relaxed),
            firewall_failures: self.firewall_failures.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub mutations_committed: u64,
    pub mutations_rejected: u64,
    pub mutations_conflicted: u64,
    pub events_propagated: u64,
    pub events_reconciled: u64,
    pub commands_succeeded: u64,
    pub commands_failed: u64,
    pub firewall_passes: u64,
    pub firewall_failures: u64,
    pub resolutions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.mutations_committed, 0);
        assert_eq!(snapshot.commands_failed, 0);
    }

    #[test]
    fn test_outcome_counters() {
        let registry = MetricsRegistry::new();
        registry.record_command(true);
        registry.record_command(false);
        registry.record_command(false);
        registry.record_firewall(true);
        registry.add_events_propagated(3);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.commands_succeeded, 1);
        assert_eq!(snapshot.commands_failed, 2);
        assert_eq!(snapshot.firewall_passes, 1);
        assert_eq!(snapshot.events_propagated, 3);
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = MetricsRegistry::new();
        registry.increment_mutations_conflicted();
        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json["mutations_conflicted"], 1);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_mutations_committed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().mutations_committed, 800);
    }
}

//! Cache activity counters.
//!
//! Lock-free atomic counters updated from the refresh paths, and a
//! point-in-time [`CacheMetricsSnapshot`] for display.
//!
//! ```text
//! RunIndex / RunSnapshotCache ───► CacheMetrics ───► CacheMetricsSnapshot ───► CLI, API
//!                                  (atomic counters)   (plain copy)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters shared by every slot of one orchestrator.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    index_scans: AtomicU64,
    index_changes: AtomicU64,
    snapshot_probes: AtomicU64,
    probe_changes: AtomicU64,
    full_reloads: AtomicU64,
    deferred_refreshes: AtomicU64,
    failed_loads: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory rescan of the run index ran.
    pub fn index_scanned(&self) {
        self.index_scans.fetch_add(1, Ordering::Relaxed);
    }

    /// A rescan found new experiments or runs.
    pub fn index_changed(&self) {
        self.index_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// A cheap max-step probe ran against a cached snapshot.
    pub fn snapshot_probed(&self) {
        self.snapshot_probes.fetch_add(1, Ordering::Relaxed);
    }

    /// A probe saw a new max step and triggered a reload.
    pub fn probe_changed(&self) {
        self.probe_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// An expensive full snapshot reload ran to completion.
    pub fn full_reloaded(&self) {
        self.full_reloads.fetch_add(1, Ordering::Relaxed);
    }

    /// A refresh of an existing snapshot failed and the old value was kept.
    pub fn refresh_deferred(&self) {
        self.deferred_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// A first load failed; the run is unavailable.
    pub fn load_failed(&self) {
        self.failed_loads.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            index_scans: self.index_scans.load(Ordering::Relaxed),
            index_changes: self.index_changes.load(Ordering::Relaxed),
            snapshot_probes: self.snapshot_probes.load(Ordering::Relaxed),
            probe_changes: self.probe_changes.load(Ordering::Relaxed),
            full_reloads: self.full_reloads.load(Ordering::Relaxed),
            deferred_refreshes: self.deferred_refreshes.load(Ordering::Relaxed),
            failed_loads: self.failed_loads.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetricsSnapshot {
    pub index_scans: u64,
    pub index_changes: u64,
    pub snapshot_probes: u64,
    pub probe_changes: u64,
    pub full_reloads: u64,
    pub deferred_refreshes: u64,
    pub failed_loads: u64,
}

impl CacheMetricsSnapshot {
    /// Fraction of snapshot refreshes answered by the cheap probe alone.
    pub fn probe_hit_rate(&self) -> f64 {
        if self.snapshot_probes == 0 {
            return 0.0;
        }
        let quiet = self.snapshot_probes.saturating_sub(self.probe_changes);
        quiet as f64 / self.snapshot_probes as f64
    }
}

impl fmt::Display for CacheMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index: {} scans ({} changed) | runs: {} probes, {} reloads, {} deferred, {} failed",
            self.index_scans,
            self.index_changes,
            self.snapshot_probes,
            self.full_reloads,
            self.deferred_refreshes,
            self.failed_loads
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.snapshot(), CacheMetricsSnapshot::default());
    }

    #[test]
    fn test_counters_increment() {
        let metrics = CacheMetrics::new();
        metrics.index_scanned();
        metrics.index_scanned();
        metrics.index_changed();
        metrics.snapshot_probed();
        metrics.probe_changed();
        metrics.full_reloaded();
        metrics.refresh_deferred();
        metrics.load_failed();

        let snap = metrics.snapshot();
        assert_eq!(snap.index_scans, 2);
        assert_eq!(snap.index_changes, 1);
        assert_eq!(snap.snapshot_probes, 1);
        assert_eq!(snap.probe_changes, 1);
        assert_eq!(snap.full_reloads, 1);
        assert_eq!(snap.deferred_refreshes, 1);
        assert_eq!(snap.failed_loads, 1);
    }

    #[test]
    fn test_probe_hit_rate() {
        let snap = CacheMetricsSnapshot {
            snapshot_probes: 10,
            probe_changes: 2,
            ..Default::default()
        };
        assert!((snap.probe_hit_rate() - 0.8).abs() < f64::EPSILON);
        assert_eq!(CacheMetricsSnapshot::default().probe_hit_rate(), 0.0);
    }

    #[test]
    fn test_display() {
        let snap = CacheMetricsSnapshot {
            index_scans: 3,
            full_reloads: 7,
            ..Default::default()
        };
        let display = snap.to_string();
        assert!(display.contains("3 scans"));
        assert!(display.contains("7 reloads"));
    }
}

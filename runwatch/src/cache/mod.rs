//! Adaptive polling caches for run snapshots.
//!
//! Training runs write to disk continuously while the dashboard reads them.
//! Instead of re-reading everything on every request, each cached value sits
//! in an [`AdaptiveCacheSlot`] that re-checks its source only when its delay
//! has elapsed, and tunes that delay from whether the source was changing.
//!
//! # Architecture
//!
//! ```text
//! CacheOrchestrator
//!   ├── RunIndex          AdaptiveCacheSlot<IndexScanner>     (experiment -> run ids)
//!   └── DashMap<Uuid, RunSnapshotCache>
//!         └── AdaptiveCacheSlot<SnapshotLoader>               (one run snapshot)
//!                        │
//!                        ▼
//!                   RunStore (descriptor, disk usage, scalars, indicators, configs)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use runwatch::cache::CacheOrchestrator;
//! use runwatch::config::CacheConfig;
//! use runwatch::store::FsRunStore;
//! use std::sync::Arc;
//!
//! let config = CacheConfig::new("/data/logs", "/data/analytics");
//! let cache = CacheOrchestrator::new(Arc::new(FsRunStore::new()), &config);
//!
//! for run in cache.get_all().await? {
//!     println!("{} step {}", run.identity(), run.max_step());
//! }
//! ```

mod metrics;
mod orchestrator;
mod run_index;
mod run_snapshot;
mod slot;
mod traits;

#[cfg(test)]
mod testing;

pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use orchestrator::CacheOrchestrator;
pub use run_index::{ExperimentRunIndex, IndexScanner, RunIndex};
pub use run_snapshot::{RunSnapshotCache, SnapshotLoader};
pub use slot::{AdaptiveCacheSlot, DelayPolicy, DelayPolicyError};
pub use traits::{CacheError, CacheResult, Probe, RefreshSource};

//! Cache orchestrator.
//!
//! Owns the run index and one [`RunSnapshotCache`] per run id, and is the
//! only entry point the API layer talks to.
//!
//! ```text
//! get_run(id) ──► RunIndex.get() ──► experiment_of(id) ──► reconcile slot ──► slot.get()
//!                                                           │
//!                               absent or experiment changed └─► new RunSnapshotCache
//! ```
//!
//! Construct one orchestrator at process start and share it (`Arc`) with
//! whatever serves the data; independent instances never share state.
//!
//! # Failure isolation
//!
//! A root listing failure fails every operation; an experiment whose runs
//! cannot be listed is left out of the index. Per-run load failures fail
//! `get_run` for that run only; bulk reads drop the run and keep the rest.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use uuid::Uuid;

use super::metrics::{CacheMetrics, CacheMetricsSnapshot};
use super::run_index::{ExperimentRunIndex, IndexScanner, RunIndex};
use super::run_snapshot::{RunSnapshotCache, SnapshotLoader};
use super::slot::DelayPolicy;
use super::traits::{CacheError, CacheResult};
use crate::config::CacheConfig;
use crate::run::{RunIdentity, RunSnapshot};
use crate::store::{RunLayout, RunStore};

/// Entry point for reading run snapshots through the adaptive caches.
pub struct CacheOrchestrator {
    store: Arc<dyn RunStore>,
    layout: Arc<RunLayout>,
    snapshot_policy: DelayPolicy,
    index: RunIndex,
    runs: DashMap<Uuid, Arc<RunSnapshotCache>>,
    metrics: Arc<CacheMetrics>,
}

impl CacheOrchestrator {
    /// Create an orchestrator with empty caches.
    ///
    /// Nothing is read until the first call.
    pub fn new(store: Arc<dyn RunStore>, config: &CacheConfig) -> Self {
        let layout = Arc::new(config.layout());
        let metrics = Arc::new(CacheMetrics::new());
        let scanner = IndexScanner::new(Arc::clone(&store), Arc::clone(&layout), Arc::clone(&metrics));

        tracing::debug!(
            experiments = %layout.experiments_root().display(),
            analytics = %layout.analytics_root().display(),
            "Created cache orchestrator"
        );

        Self {
            store,
            layout,
            snapshot_policy: config.snapshot_policy,
            index: RunIndex::new(scanner, config.index_policy),
            runs: DashMap::new(),
            metrics,
        }
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// Current run index, rescanning if due.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::IndexScan`] if the experiments root cannot be
    /// listed.
    pub async fn index(&self) -> CacheResult<Arc<ExperimentRunIndex>> {
        self.index.get().await.map_err(CacheError::IndexScan)
    }

    /// Snapshot of one run.
    ///
    /// # Errors
    ///
    /// - [`CacheError::IndexScan`] if the index cannot be read
    /// - [`CacheError::NotFound`] if no experiment holds `run_id`
    /// - [`CacheError::RunLoad`] if the run has never loaded successfully
    pub async fn get_run(&self, run_id: Uuid) -> CacheResult<Arc<RunSnapshot>> {
        let index = self.index().await?;
        let experiment = index
            .experiment_of(&run_id)
            .ok_or(CacheError::NotFound(run_id))?;
        self.load(RunIdentity::new(experiment, run_id)).await
    }

    /// Snapshots of every loadable run of one experiment.
    ///
    /// An unknown experiment yields an empty list. A run id also listed
    /// under an earlier experiment (mid-rename) is reported there, as by
    /// [`get_all`](Self::get_all), so its cache stays bound to one identity.
    ///
    /// # Errors
    ///
    /// Only index scan failures are errors.
    pub async fn get_experiment(&self, experiment_name: &str) -> CacheResult<Vec<Arc<RunSnapshot>>> {
        let index = self.index().await?;
        let identities = index
            .runs(experiment_name)
            .map(|runs| {
                runs.iter()
                    .filter(|run_id| index.experiment_of(run_id) == Some(experiment_name))
                    .map(|run_id| RunIdentity::new(experiment_name, *run_id))
                    .collect()
            })
            .unwrap_or_default();
        Ok(self.load_all(identities).await)
    }

    /// Snapshots of every loadable run of every experiment, in no
    /// particular order. Each run id appears at most once.
    ///
    /// # Errors
    ///
    /// Only index scan failures are errors.
    pub async fn get_all(&self) -> CacheResult<Vec<Arc<RunSnapshot>>> {
        let index = self.index().await?;
        Ok(self.load_all(index.identities()).await)
    }

    /// Forget the cached snapshot of `run_id` and force a rescan of the index
    /// on its next access.
    ///
    /// Call after renaming, deleting or creating runs out of band.
    pub fn invalidate_run(&self, run_id: Uuid) {
        let dropped = self.runs.remove(&run_id).is_some();
        self.index.invalidate();
        tracing::debug!(run = %run_id, dropped, "Invalidated run");
    }

    /// Point-in-time cache counters.
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Current refresh delay of the run index.
    pub async fn index_delay(&self) -> Duration {
        self.index.current_delay().await
    }

    /// Number of runs with a snapshot cache.
    pub fn cached_run_count(&self) -> usize {
        self.runs.len()
    }

    async fn load(&self, identity: RunIdentity) -> CacheResult<Arc<RunSnapshot>> {
        let run_id = identity.run_id;
        self.slot_for(identity)
            .get()
            .await
            .map_err(|source| CacheError::RunLoad { run_id, source })
    }

    async fn load_all(&self, identities: Vec<RunIdentity>) -> Vec<Arc<RunSnapshot>> {
        let results = join_all(identities.into_iter().map(|identity| self.load(identity))).await;

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping run");
                    None
                }
            })
            .collect()
    }

    /// Slot bound to `identity`, replacing one bound to a stale experiment.
    ///
    /// Lookup and insert happen under one map entry, with no await in between.
    fn slot_for(&self, identity: RunIdentity) -> Arc<RunSnapshotCache> {
        match self.runs.entry(identity.run_id) {
            Entry::Occupied(entry) if entry.get().identity() == &identity => Arc::clone(entry.get()),
            Entry::Occupied(mut entry) => {
                tracing::info!(
                    run = %identity.run_id,
                    from = %entry.get().identity().experiment_name,
                    to = %identity.experiment_name,
                    "Run moved to another experiment"
                );
                let cache = self.new_slot(identity);
                entry.insert(Arc::clone(&cache));
                cache
            }
            Entry::Vacant(entry) => {
                let cache = self.new_slot(identity);
                entry.insert(Arc::clone(&cache));
                cache
            }
        }
    }

    fn new_slot(&self, identity: RunIdentity) -> Arc<RunSnapshotCache> {
        let loader = SnapshotLoader::new(
            identity,
            &self.layout,
            Arc::clone(&self.store),
            Arc::clone(&self.metrics),
        );
        Arc::new(RunSnapshotCache::new(loader, self.snapshot_policy))
    }
}

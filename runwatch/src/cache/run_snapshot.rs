//! Per-run snapshot cache.
//!
//! A snapshot merges everything the dashboard shows for one run: the run
//! descriptor, disk usage, and training state (latest indicator values,
//! configs, indicator declarations). Building it means reading several files,
//! walking directories and querying SQLite, so refreshes are split in two:
//!
//! ```text
//! probe:        latest_values(printable indicators) ──► max step
//!                   │
//!                   ├── same max step ──► Unchanged (no further I/O)
//!                   └── different     ──► full reload ──► Changed(snapshot)
//! full reload:  descriptor + 6 disk usages + indicators + values + configs
//! ```
//!
//! # Failures
//!
//! A failed first load is surfaced to the caller; the run is unavailable.
//! Once a snapshot exists, a failed probe or reload (database locked, file
//! mid-write, run directory briefly missing) is logged and deferred: the old
//! snapshot keeps being served and the refresh is retried on the next call.

use std::sync::Arc;
use std::time::Duration;

use super::metrics::CacheMetrics;
use super::slot::{AdaptiveCacheSlot, DelayPolicy};
use super::traits::{Probe, RefreshSource};
use crate::run::{max_step, DiskUsage, IndicatorMap, RunIdentity, RunSnapshot};
use crate::store::{BoxFuture, RunLayout, RunPaths, RunStore, SourceError};

/// Names of the indicators whose values are queried.
fn printable(indicators: &IndicatorMap) -> Vec<String> {
    indicators
        .iter()
        .filter(|(_, indicator)| indicator.is_print)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Loads and probes the snapshot of one run.
pub struct SnapshotLoader {
    identity: RunIdentity,
    paths: RunPaths,
    store: Arc<dyn RunStore>,
    metrics: Arc<CacheMetrics>,
}

impl SnapshotLoader {
    pub fn new(
        identity: RunIdentity,
        layout: &RunLayout,
        store: Arc<dyn RunStore>,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            paths: layout.run_paths(&identity),
            identity,
            store,
            metrics,
        }
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    async fn disk_usage(&self) -> Result<DiskUsage, SourceError> {
        let p = &self.paths;
        let (total, artifacts, checkpoints, tensorboard, sqlite, analytics) = futures::try_join!(
            self.store.disk_usage_bytes(&p.run_dir),
            self.store.disk_usage_bytes(&p.artifacts),
            self.store.disk_usage_bytes(&p.checkpoints),
            self.store.disk_usage_bytes(&p.tensorboard),
            self.store.disk_usage_bytes(&p.sqlite),
            self.store.disk_usage_bytes(&p.analytics),
        )?;

        Ok(DiskUsage {
            total,
            artifacts,
            checkpoints,
            tensorboard,
            sqlite,
            analytics,
        })
    }

    /// Build the snapshot from scratch.
    pub async fn full_reload(&self) -> Result<RunSnapshot, SourceError> {
        let descriptor = self.store.read_descriptor(&self.paths).await?;

        let (size, indicators, configs) = futures::try_join!(
            self.disk_usage(),
            self.store.indicators(&self.paths),
            self.store.configs(&self.paths),
        )?;

        let names = printable(&indicators);
        let values = self.store.latest_values(&self.paths, &names).await?;

        self.metrics.full_reloaded();
        tracing::info!(
            run = %self.identity,
            step = max_step(&values),
            size = size.total,
            "Loaded run snapshot"
        );

        Ok(RunSnapshot {
            run_id: self.identity.run_id,
            experiment_name: self.identity.experiment_name.clone(),
            descriptor,
            size,
            values,
            configs,
            indicators,
        })
    }

    /// Keep serving the cached snapshot after a failed refresh.
    fn defer(&self, stage: &str, error: &SourceError) -> Probe<RunSnapshot> {
        self.metrics.refresh_deferred();
        tracing::warn!(
            run = %self.identity,
            stage,
            error = %error,
            "Run refresh failed, keeping cached snapshot"
        );
        Probe::Deferred
    }
}

impl RefreshSource for SnapshotLoader {
    type Value = RunSnapshot;

    fn reload(&self) -> BoxFuture<'_, Result<RunSnapshot, SourceError>> {
        Box::pin(async move {
            self.full_reload().await.inspect_err(|e| {
                self.metrics.load_failed();
                tracing::warn!(run = %self.identity, error = %e, "Failed to load run");
            })
        })
    }

    fn probe<'a>(
        &'a self,
        previous: &'a RunSnapshot,
    ) -> BoxFuture<'a, Result<Probe<RunSnapshot>, SourceError>> {
        Box::pin(async move {
            self.metrics.snapshot_probed();

            let names = printable(&previous.indicators);
            let fresh = match self.store.latest_values(&self.paths, &names).await {
                Ok(values) => values,
                Err(e) => return Ok(self.defer("probe", &e)),
            };

            let current_step = max_step(&fresh);
            let cached_step = previous.max_step();
            if current_step == cached_step {
                tracing::debug!(run = %self.identity, step = current_step, "Run unchanged");
                return Ok(Probe::Unchanged);
            }

            self.metrics.probe_changed();
            tracing::debug!(
                run = %self.identity,
                from = cached_step,
                to = current_step,
                "Run step changed"
            );

            match self.full_reload().await {
                Ok(snapshot) => Ok(Probe::Changed(snapshot)),
                Err(e) => Ok(self.defer("reload", &e)),
            }
        })
    }
}

/// Adaptive cache of one run's snapshot, bound to a fixed identity.
pub struct RunSnapshotCache {
    slot: AdaptiveCacheSlot<SnapshotLoader>,
}

impl RunSnapshotCache {
    pub fn new(loader: SnapshotLoader, policy: DelayPolicy) -> Self {
        Self {
            slot: AdaptiveCacheSlot::new(loader, policy),
        }
    }

    /// Identity this cache is bound to.
    pub fn identity(&self) -> &RunIdentity {
        self.slot.source().identity()
    }

    /// Current snapshot, probing or reloading if due.
    ///
    /// # Errors
    ///
    /// Only a failed load with nothing cached is an error.
    pub async fn get(&self) -> Result<Arc<RunSnapshot>, SourceError> {
        self.slot.get().await
    }

    /// Force a full reload on the next `get()`.
    pub fn invalidate(&self) {
        self.slot.invalidate();
    }

    pub async fn current_delay(&self) -> Duration {
        self.slot.current_delay().await
    }
}

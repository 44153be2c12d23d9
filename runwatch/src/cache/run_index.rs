//! Index of known experiments and runs.
//!
//! The index is discovered by listing the experiments root: one directory per
//! experiment, one UUID-named directory per run. A rescan is a cheap
//! directory listing, so the index uses short delays.
//!
//! # Change detection
//!
//! A rescan counts as a change only when it contains an experiment or run id
//! that the cached index does not. Removals are never detected by polling: a
//! deleted or renamed run stays in the cached index until
//! [`RunIndex::invalidate`] is called by whoever deleted or renamed it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use super::metrics::CacheMetrics;
use super::slot::{AdaptiveCacheSlot, DelayPolicy};
use super::traits::{Probe, RefreshSource};
use crate::run::RunIdentity;
use crate::store::{BoxFuture, RunLayout, RunStore, SourceError};

/// Experiment name to the run ids found under it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExperimentRunIndex {
    experiments: BTreeMap<String, BTreeSet<Uuid>>,
}

impl ExperimentRunIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a run under an experiment.
    pub fn insert(&mut self, experiment_name: impl Into<String>, run_id: Uuid) {
        self.experiments
            .entry(experiment_name.into())
            .or_default()
            .insert(run_id);
    }

    /// Record an experiment with no runs yet.
    pub fn insert_experiment(&mut self, experiment_name: impl Into<String>) {
        self.experiments.entry(experiment_name.into()).or_default();
    }

    /// Experiment names, sorted.
    pub fn experiments(&self) -> impl Iterator<Item = &str> {
        self.experiments.keys().map(String::as_str)
    }

    /// Run ids of one experiment, `None` if the experiment is unknown.
    pub fn runs(&self, experiment_name: &str) -> Option<&BTreeSet<Uuid>> {
        self.experiments.get(experiment_name)
    }

    /// The experiment currently holding `run_id`.
    pub fn experiment_of(&self, run_id: &Uuid) -> Option<&str> {
        self.experiments
            .iter()
            .find(|(_, runs)| runs.contains(run_id))
            .map(|(name, _)| name.as_str())
    }

    /// Every identity in the index.
    ///
    /// A run id that appears under two experiments (mid-rename) is reported
    /// once, under the first experiment in name order.
    pub fn identities(&self) -> Vec<RunIdentity> {
        let mut seen = BTreeSet::new();
        let mut identities = Vec::new();
        for (experiment, runs) in &self.experiments {
            for run_id in runs {
                if seen.insert(*run_id) {
                    identities.push(RunIdentity::new(experiment.clone(), *run_id));
                }
            }
        }
        identities
    }

    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    pub fn run_count(&self) -> usize {
        self.experiments.values().map(BTreeSet::len).sum()
    }

    /// Whether `self` holds an experiment or run id absent from `previous`.
    ///
    /// Pure set growth: removals do not count.
    pub fn grew_from(&self, previous: &ExperimentRunIndex) -> bool {
        self.experiments.iter().any(|(name, runs)| {
            match previous.experiments.get(name) {
                None => true,
                Some(known) => !runs.is_subset(known),
            }
        })
    }
}

/// Scans the experiments root to build the index.
pub struct IndexScanner {
    store: Arc<dyn RunStore>,
    layout: Arc<RunLayout>,
    metrics: Arc<CacheMetrics>,
}

impl IndexScanner {
    pub fn new(store: Arc<dyn RunStore>, layout: Arc<RunLayout>, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            store,
            layout,
            metrics,
        }
    }

    /// List every experiment and its runs.
    ///
    /// Experiment names starting with an underscore are skipped, as are
    /// experiments whose directory cannot be listed.
    ///
    /// # Errors
    ///
    /// Only a failure to list the experiments root is an error.
    pub async fn scan(&self) -> Result<ExperimentRunIndex, SourceError> {
        self.metrics.index_scanned();

        let root = self.layout.experiments_root();
        let names: Vec<String> = self
            .store
            .list_experiments(root)
            .await?
            .into_iter()
            .filter(|name| !name.starts_with('_'))
            .collect();

        let dirs: Vec<_> = names
            .iter()
            .map(|name| self.layout.experiment_dir(name))
            .collect();
        let listings = join_all(dirs.iter().map(|dir| self.store.list_runs(dir))).await;

        let mut index = ExperimentRunIndex::new();
        for (name, listing) in names.into_iter().zip(listings) {
            let runs = match listing {
                Ok(runs) => runs,
                Err(e) => {
                    tracing::warn!(experiment = %name, error = %e, "Skipping unreadable experiment");
                    continue;
                }
            };
            index.insert_experiment(name.clone());
            for run_id in runs {
                index.insert(name.clone(), run_id);
            }
        }

        tracing::debug!(
            root = %root.display(),
            experiments = index.experiment_count(),
            runs = index.run_count(),
            "Scanned run index"
        );
        Ok(index)
    }
}

impl RefreshSource for IndexScanner {
    type Value = ExperimentRunIndex;

    fn reload(&self) -> BoxFuture<'_, Result<ExperimentRunIndex, SourceError>> {
        Box::pin(async move {
            let index = self.scan().await?;
            self.metrics.index_changed();
            Ok(index)
        })
    }

    fn probe<'a>(
        &'a self,
        previous: &'a ExperimentRunIndex,
    ) -> BoxFuture<'a, Result<Probe<ExperimentRunIndex>, SourceError>> {
        Box::pin(async move {
            let loaded = self.scan().await?;
            if loaded.grew_from(previous) {
                self.metrics.index_changed();
                tracing::info!(
                    experiments = loaded.experiment_count(),
                    runs = loaded.run_count(),
                    "Run index changed"
                );
                Ok(Probe::Changed(loaded))
            } else {
                Ok(Probe::Unchanged)
            }
        })
    }
}

/// Adaptive cache of the experiment/run index.
pub struct RunIndex {
    slot: AdaptiveCacheSlot<IndexScanner>,
}

impl RunIndex {
    pub fn new(scanner: IndexScanner, policy: DelayPolicy) -> Self {
        Self {
            slot: AdaptiveCacheSlot::new(scanner, policy),
        }
    }

    /// Current index, rescanning if due.
    ///
    /// # Errors
    ///
    /// Scan failures propagate; no run can be resolved without the index.
    pub async fn get(&self) -> Result<Arc<ExperimentRunIndex>, SourceError> {
        self.slot.get().await
    }

    /// Force a full rescan on the next `get()`.
    pub fn invalidate(&self) {
        self.slot.invalidate();
    }

    pub async fn current_delay(&self) -> Duration {
        self.slot.current_delay().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn index(entries: &[(&str, &[u128])]) -> ExperimentRunIndex {
        let mut index = ExperimentRunIndex::new();
        for (name, runs) in entries {
            index.insert_experiment(*name);
            for run in *runs {
                index.insert(*name, uuid(*run));
            }
        }
        index
    }

    #[test]
    fn test_identical_scan_is_unchanged() {
        let a = index(&[("exp1", &[1, 2][..]), ("exp2", &[3][..])]);
        assert!(!a.clone().grew_from(&a));
    }

    #[test]
    fn test_new_experiment_is_change() {
        let before = index(&[("exp1", &[1, 2][..])]);
        let after = index(&[("exp1", &[1, 2][..]), ("exp2", &[3][..])]);
        assert!(after.grew_from(&before));
    }

    #[test]
    fn test_new_empty_experiment_is_change() {
        let before = index(&[("exp1", &[1][..])]);
        let after = index(&[("exp1", &[1][..]), ("exp2", &[0u128; 0][..])]);
        assert!(after.grew_from(&before));
    }

    #[test]
    fn test_new_run_is_change() {
        let before = index(&[("exp1", &[1][..])]);
        let after = index(&[("exp1", &[1, 2][..])]);
        assert!(after.grew_from(&before));
    }

    #[test]
    fn test_removal_is_not_change() {
        let before = index(&[("exp1", &[1, 2][..]), ("exp2", &[3][..])]);
        let after = index(&[("exp1", &[1][..])]);
        assert!(!after.grew_from(&before));
    }

    #[test]
    fn test_experiment_of() {
        let idx = index(&[("exp1", &[1, 2][..]), ("exp2", &[3][..])]);
        assert_eq!(idx.experiment_of(&uuid(3)), Some("exp2"));
        assert_eq!(idx.experiment_of(&uuid(9)), None);
    }

    #[test]
    fn test_identities_deduplicate_run_ids() {
        let idx = index(&[("a", &[1, 2][..]), ("b", &[2, 3][..])]);
        let ids = idx.identities();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&RunIdentity::new("a", uuid(2))));
        assert!(!ids.contains(&RunIdentity::new("b", uuid(2))));
    }

    fn arb_index() -> impl Strategy<Value = BTreeMap<String, BTreeSet<u8>>> {
        prop::collection::btree_map(
            "[a-c]",
            prop::collection::btree_set(any::<u8>(), 0..6),
            0..4,
        )
    }

    fn from_map(map: &BTreeMap<String, BTreeSet<u8>>) -> ExperimentRunIndex {
        let mut idx = ExperimentRunIndex::new();
        for (name, runs) in map {
            idx.insert_experiment(name.clone());
            for run in runs {
                idx.insert(name.clone(), uuid(*run as u128));
            }
        }
        idx
    }

    proptest! {
        #[test]
        fn prop_change_iff_new_experiment_or_run(
            before in arb_index(),
            after in arb_index(),
        ) {
            let expected = after.iter().any(|(name, runs)| match before.get(name) {
                None => true,
                Some(known) => runs.iter().any(|r| !known.contains(r)),
            });
            prop_assert_eq!(from_map(&after).grew_from(&from_map(&before)), expected);
        }

        #[test]
        fn prop_scan_never_grows_from_itself(map in arb_index()) {
            let idx = from_map(&map);
            prop_assert!(!idx.grew_from(&idx));
        }
    }
}

//! In-memory run store for cache unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use uuid::Uuid;

use crate::run::{
    max_step, ConfigMap, ConfigValue, Indicator, IndicatorMap, IndicatorValue, RunDescriptor,
    RunIdentity, ValueMap, STEP_INDICATOR,
};
use crate::store::{BoxFuture, RunPaths, RunStore, SourceError, SourceResult};

#[derive(Debug, Clone, Default)]
pub struct MemoryRun {
    pub descriptor: Option<RunDescriptor>,
    pub scalars: ValueMap,
    pub indicators: IndicatorMap,
    pub configs: ConfigMap,
}

#[derive(Debug, Default)]
struct State {
    experiments: BTreeMap<String, Vec<Uuid>>,
    runs: HashMap<RunIdentity, MemoryRun>,
    failing_values: HashSet<Uuid>,
    failing_experiments: HashSet<String>,
}

/// Scriptable store with call counters.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    state: Mutex<State>,
    fail_listing: AtomicBool,
    pub descriptor_reads: AtomicUsize,
    pub value_queries: AtomicUsize,
    pub experiment_listings: AtomicUsize,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a run with a `loss` indicator recorded at `step`.
    pub fn add_run(&self, experiment: &str, run_id: Uuid, step: u64) {
        let mut indicators = IndicatorMap::new();
        indicators.insert(
            "loss".to_string(),
            Indicator {
                class_name: "Scalar".to_string(),
                is_print: true,
                ..Indicator::default()
            },
        );
        let mut configs = ConfigMap::new();
        configs.insert(
            "lr".to_string(),
            ConfigValue {
                name: "lr".to_string(),
                value: serde_json::json!(0.01),
                is_explicitly_specified: true,
                ..ConfigValue::default()
            },
        );
        let mut scalars = ValueMap::new();
        scalars.insert("loss".to_string(), IndicatorValue::new(1.0 / (step as f64 + 1.0), step));

        let run = MemoryRun {
            descriptor: Some(RunDescriptor {
                name: format!("{}_run", experiment),
                ..RunDescriptor::default()
            }),
            scalars,
            indicators,
            configs,
        };

        let mut state = self.state.lock().unwrap();
        let runs = state.experiments.entry(experiment.to_string()).or_default();
        if !runs.contains(&run_id) {
            runs.push(run_id);
        }
        state.runs.insert(RunIdentity::new(experiment, run_id), run);
    }

    /// Record a new `loss` value at `step`.
    pub fn set_step(&self, experiment: &str, run_id: Uuid, step: u64) {
        let mut state = self.state.lock().unwrap();
        if let Some(run) = state.runs.get_mut(&RunIdentity::new(experiment, run_id)) {
            run.scalars
                .insert("loss".to_string(), IndicatorValue::new(0.5, step));
        }
    }

    /// Remove the run's descriptor, as if the run directory was deleted.
    pub fn remove_descriptor(&self, experiment: &str, run_id: Uuid) {
        let mut state = self.state.lock().unwrap();
        if let Some(run) = state.runs.get_mut(&RunIdentity::new(experiment, run_id)) {
            run.descriptor = None;
        }
    }

    /// Move a run to another experiment.
    pub fn rename(&self, from: &str, to: &str, run_id: Uuid) {
        let mut state = self.state.lock().unwrap();
        if let Some(runs) = state.experiments.get_mut(from) {
            runs.retain(|r| *r != run_id);
        }
        state.experiments.entry(to.to_string()).or_default().push(run_id);
        if let Some(run) = state.runs.remove(&RunIdentity::new(from, run_id)) {
            state.runs.insert(RunIdentity::new(to, run_id), run);
        }
    }

    /// Delete a run entirely.
    pub fn remove_run(&self, experiment: &str, run_id: Uuid) {
        let mut state = self.state.lock().unwrap();
        if let Some(runs) = state.experiments.get_mut(experiment) {
            runs.retain(|r| *r != run_id);
        }
        state.runs.remove(&RunIdentity::new(experiment, run_id));
    }

    pub fn fail_values_for(&self, run_id: Uuid, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing_values.insert(run_id);
        } else {
            state.failing_values.remove(&run_id);
        }
    }

    /// Make listing the runs of `experiment` fail.
    pub fn fail_runs_of(&self, experiment: &str, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing_experiments.insert(experiment.to_string());
        } else {
            state.failing_experiments.remove(experiment);
        }
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    fn run(&self, identity: &RunIdentity) -> Option<MemoryRun> {
        self.state.lock().unwrap().runs.get(identity).cloned()
    }
}

impl RunStore for MemoryRunStore {
    fn list_experiments<'a>(&'a self, root: &'a Path) -> BoxFuture<'a, SourceResult<Vec<String>>> {
        Box::pin(async move {
            self.experiment_listings.fetch_add(1, Ordering::SeqCst);
            if self.fail_listing.load(Ordering::SeqCst) {
                return Err(SourceError::io(
                    root,
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                ));
            }
            Ok(self.state.lock().unwrap().experiments.keys().cloned().collect())
        })
    }

    fn list_runs<'a>(&'a self, experiment_dir: &'a Path) -> BoxFuture<'a, SourceResult<Vec<Uuid>>> {
        Box::pin(async move {
            let name = experiment_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let state = self.state.lock().unwrap();
            if state.failing_experiments.contains(&name) {
                return Err(SourceError::io(
                    experiment_dir,
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                ));
            }
            Ok(state.experiments.get(&name).cloned().unwrap_or_default())
        })
    }

    fn read_descriptor<'a>(&'a self, paths: &'a RunPaths) -> BoxFuture<'a, SourceResult<RunDescriptor>> {
        Box::pin(async move {
            self.descriptor_reads.fetch_add(1, Ordering::SeqCst);
            self.run(&paths.identity)
                .and_then(|run| run.descriptor)
                .ok_or_else(|| SourceError::MissingRun(paths.identity.clone()))
        })
    }

    fn disk_usage_bytes<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, SourceResult<u64>> {
        Box::pin(async move {
            let size = match path.file_name().and_then(|n| n.to_str()) {
                Some("artifacts") => 10,
                Some("checkpoints") => 20,
                Some("tensorboard") => 30,
                Some("sqlite.db") => 40,
                _ => 100,
            };
            Ok(size)
        })
    }

    fn latest_values<'a>(
        &'a self,
        paths: &'a RunPaths,
        indicators: &'a [String],
    ) -> BoxFuture<'a, SourceResult<ValueMap>> {
        Box::pin(async move {
            self.value_queries.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .state
                .lock()
                .unwrap()
                .failing_values
                .contains(&paths.identity.run_id);
            if failing {
                return Err(SourceError::TaskJoin("database is locked".to_string()));
            }

            let scalars = self.run(&paths.identity).map(|r| r.scalars).unwrap_or_default();
            let step = max_step(&scalars);
            let mut values: ValueMap = scalars
                .into_iter()
                .filter(|(name, _)| indicators.contains(name))
                .collect();
            values.insert(STEP_INDICATOR.to_string(), IndicatorValue::new(step as f64, step));
            Ok(values)
        })
    }

    fn indicators<'a>(&'a self, paths: &'a RunPaths) -> BoxFuture<'a, SourceResult<IndicatorMap>> {
        Box::pin(async move {
            Ok(self
                .run(&paths.identity)
                .map(|r| r.indicators)
                .unwrap_or_default())
        })
    }

    fn configs<'a>(&'a self, paths: &'a RunPaths) -> BoxFuture<'a, SourceResult<ConfigMap>> {
        Box::pin(async move {
            Ok(self
                .run(&paths.identity)
                .map(|r| r.configs)
                .unwrap_or_default())
        })
    }
}

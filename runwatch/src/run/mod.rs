//! Run data model.
//!
//! Plain data types shared by the cache and its collaborators. Everything
//! here is serializable so the API layer can hand snapshots to a browser
//! client without conversion.
//!
//! # Types
//!
//! - [`RunIdentity`]: which experiment a run id currently belongs to
//! - [`RunDescriptor`]: descriptive fields parsed from the run's YAML file
//! - [`RunSnapshot`]: the merged, denormalized view cached per run

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key of the synthetic indicator holding the run's highest training step.
pub const STEP_INDICATOR: &str = "step";

/// A run id together with the experiment that currently owns it.
///
/// A rename moves a run id to a different experiment, so two identities with
/// the same `run_id` but different experiment names are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Experiment directory name.
    pub experiment_name: String,
    /// Run directory name, parsed as a UUID.
    pub run_id: Uuid,
}

impl RunIdentity {
    /// Create a new identity.
    pub fn new(experiment_name: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            run_id,
        }
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.experiment_name, self.run_id)
    }
}

/// Latest recorded value of one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    /// Numeric value at `step`.
    pub value: f64,
    /// Training step the value was recorded at.
    pub step: u64,
}

impl IndicatorValue {
    pub fn new(value: f64, step: u64) -> Self {
        Self { value, step }
    }
}

/// Indicator name to latest value, always including [`STEP_INDICATOR`].
pub type ValueMap = BTreeMap<String, IndicatorValue>;

/// Highest step over every entry of a value map, `0` when empty.
///
/// Order-independent: the result only depends on the set of steps.
pub fn max_step(values: &ValueMap) -> u64 {
    values.values().map(|v| v.step).max().unwrap_or(0)
}

/// A declared metric series of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Indicator {
    /// Indicator class (e.g. `Scalar`, `Histogram`).
    #[serde(default)]
    pub class_name: String,
    /// Whether the indicator is shown on the dashboard, and therefore queried.
    #[serde(default)]
    pub is_print: bool,
    /// Free-form declaration options.
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Indicator name to declaration.
pub type IndicatorMap = BTreeMap<String, Indicator>;

/// One configuration entry of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigValue {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
    /// Value as derived by the training code when not set explicitly.
    #[serde(default)]
    pub computed: serde_json::Value,
    #[serde(default)]
    pub is_hyperparam: bool,
    #[serde(default)]
    pub is_explicitly_specified: bool,
    #[serde(default)]
    pub order: i64,
}

/// Config key to value.
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// Descriptive fields of a run, as read from its descriptor file.
///
/// Missing fields take the documented defaults: empty strings, `false`,
/// `0`, and tags derived from the name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub name: String,
    pub comment: String,
    pub tags: Vec<String>,
    pub commit: String,
    pub commit_message: String,
    pub is_dirty: bool,
    pub python_file: String,
    pub trial_date: String,
    pub trial_time: String,
    pub start_step: u64,
}

/// Byte counts of a run's on-disk footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiskUsage {
    /// Whole run directory.
    pub total: u64,
    pub artifacts: u64,
    pub checkpoints: u64,
    pub tensorboard: u64,
    pub sqlite: u64,
    /// Run directory under the analytics root.
    pub analytics: u64,
}

/// Merged view of a single run, the value cached by a run snapshot slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub experiment_name: String,
    #[serde(flatten)]
    pub descriptor: RunDescriptor,
    pub size: DiskUsage,
    /// Latest value per printable indicator plus the synthetic `step` entry.
    pub values: ValueMap,
    pub configs: ConfigMap,
    pub indicators: IndicatorMap,
}

impl RunSnapshot {
    /// Identity this snapshot was loaded for.
    pub fn identity(&self) -> RunIdentity {
        RunIdentity::new(self.experiment_name.clone(), self.run_id)
    }

    /// Highest training step known for this run.
    pub fn max_step(&self) -> u64 {
        max_step(&self.values)
    }

    /// Trial start parsed from `trial_date` and `trial_time`.
    ///
    /// Returns `None` when either field is empty or malformed.
    pub fn trial_started_at(&self) -> Option<NaiveDateTime> {
        let date = self.descriptor.trial_date.trim();
        let time = self.descriptor.trial_time.trim();
        if date.is_empty() || time.is_empty() {
            return None;
        }
        NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M:%S").ok()
    }
}

/// Sort snapshots newest trial first; runs without a parseable start go last.
pub fn sort_by_trial_desc(runs: &mut [Arc<RunSnapshot>]) {
    runs.sort_by(|a, b| {
        b.trial_started_at()
            .cmp(&a.trial_started_at())
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
}

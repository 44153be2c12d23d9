//! Read interfaces to the run record store.
//!
//! The cache never parses YAML, walks directories, or queries SQLite itself.
//! It goes through the [`RunStore`] trait, which exposes the narrow reads the
//! cache needs. [`FsRunStore`] is the production implementation; tests plug in
//! in-memory stores.
//!
//! # Layout
//!
//! ```text
//! <experiments_root>/<experiment>/<run uuid>/
//!     run.yaml  indicators.yaml  configs.yaml  sqlite.db
//!     artifacts/  checkpoints/  tensorboard/
//! <analytics_root>/<experiment>/<run uuid>/
//! ```

mod descriptor;
mod disk_usage;
mod fs;
mod scalars;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use thiserror::Error;
use uuid::Uuid;

use crate::run::{ConfigMap, IndicatorMap, RunDescriptor, RunIdentity, ValueMap};

pub use descriptor::{parse_configs, parse_descriptor, parse_indicators};
pub use disk_usage::disk_usage_bytes;
pub use fs::FsRunStore;
pub use scalars::{latest_values, SCALARS_TABLE};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised by run store reads.
#[derive(Debug, Error)]
pub enum SourceError {
    /// File system access failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A YAML file exists but could not be parsed.
    #[error("Failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The scalar database could not be queried.
    #[error("SQLite error at {path}: {source}")]
    Sqlite {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The run's descriptor file does not exist (deleted or never written).
    #[error("Run not found: {0}")]
    MissingRun(RunIdentity),

    /// A blocking read task panicked or was cancelled.
    #[error("Blocking task failed: {0}")]
    TaskJoin(String),
}

impl SourceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for run store reads.
pub type SourceResult<T> = Result<T, SourceError>;

/// Resolves the on-disk locations of runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    experiments_root: PathBuf,
    analytics_root: PathBuf,
}

impl RunLayout {
    /// Create a layout over the given roots.
    pub fn new(experiments_root: impl Into<PathBuf>, analytics_root: impl Into<PathBuf>) -> Self {
        Self {
            experiments_root: experiments_root.into(),
            analytics_root: analytics_root.into(),
        }
    }

    /// Root directory holding one subdirectory per experiment.
    pub fn experiments_root(&self) -> &Path {
        &self.experiments_root
    }

    /// Root directory of analytics output.
    pub fn analytics_root(&self) -> &Path {
        &self.analytics_root
    }

    /// Directory of one experiment.
    pub fn experiment_dir(&self, experiment_name: &str) -> PathBuf {
        self.experiments_root.join(experiment_name)
    }

    /// Every path belonging to one run.
    pub fn run_paths(&self, identity: &RunIdentity) -> RunPaths {
        let run_dir = self
            .experiment_dir(&identity.experiment_name)
            .join(identity.run_id.to_string());
        let analytics_dir = self
            .analytics_root
            .join(&identity.experiment_name)
            .join(identity.run_id.to_string());

        RunPaths {
            identity: identity.clone(),
            descriptor: run_dir.join("run.yaml"),
            indicators: run_dir.join("indicators.yaml"),
            configs: run_dir.join("configs.yaml"),
            sqlite: run_dir.join("sqlite.db"),
            artifacts: run_dir.join("artifacts"),
            checkpoints: run_dir.join("checkpoints"),
            tensorboard: run_dir.join("tensorboard"),
            analytics: analytics_dir,
            run_dir,
        }
    }
}

/// Locations of one run's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub identity: RunIdentity,
    pub run_dir: PathBuf,
    pub descriptor: PathBuf,
    pub indicators: PathBuf,
    pub configs: PathBuf,
    pub sqlite: PathBuf,
    pub artifacts: PathBuf,
    pub checkpoints: PathBuf,
    pub tensorboard: PathBuf,
    pub analytics: PathBuf,
}

/// Narrow read interface to the run record store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the orchestrator shares one store
/// across every cache slot through `Arc<dyn RunStore>`.
///
/// # Dyn Compatibility
///
/// Async methods return [`BoxFuture`] so the store can be used as a trait
/// object.
pub trait RunStore: Send + Sync {
    /// Names of the experiment directories under `root`.
    ///
    /// Non-directories are not returned. A nonexistent root is empty.
    fn list_experiments<'a>(&'a self, root: &'a Path) -> BoxFuture<'a, SourceResult<Vec<String>>>;

    /// Run ids of the run directories under `experiment_dir`.
    fn list_runs<'a>(&'a self, experiment_dir: &'a Path) -> BoxFuture<'a, SourceResult<Vec<Uuid>>>;

    /// Parse the run descriptor, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// [`SourceError::MissingRun`] when the descriptor file does not exist.
    fn read_descriptor<'a>(&'a self, paths: &'a RunPaths) -> BoxFuture<'a, SourceResult<RunDescriptor>>;

    /// Recursive size in bytes of `path`, `0` when it does not exist.
    fn disk_usage_bytes<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, SourceResult<u64>>;

    /// Latest value and step for each indicator in `indicators`, plus the
    /// synthetic `step` entry.
    fn latest_values<'a>(
        &'a self,
        paths: &'a RunPaths,
        indicators: &'a [String],
    ) -> BoxFuture<'a, SourceResult<ValueMap>>;

    /// Declared indicators of the run.
    fn indicators<'a>(&'a self, paths: &'a RunPaths) -> BoxFuture<'a, SourceResult<IndicatorMap>>;

    /// Explicit or derived hyperparameters of the run.
    fn configs<'a>(&'a self, paths: &'a RunPaths) -> BoxFuture<'a, SourceResult<ConfigMap>>;
}

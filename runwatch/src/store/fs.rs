//! File system and SQLite backed run store.
//!
//! Every read is blocking (directory walks, YAML files, SQLite), so each one
//! runs on tokio's blocking pool via `spawn_blocking` to keep the async
//! runtime responsive while a slow disk is scanned.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::descriptor::{parse_configs, parse_descriptor, parse_indicators};
use super::disk_usage::disk_usage_bytes;
use super::scalars::latest_values;
use super::{BoxFuture, RunPaths, RunStore, SourceError, SourceResult};
use crate::run::{ConfigMap, IndicatorMap, RunDescriptor, ValueMap};

/// Run store reading the on-disk run layout.
#[derive(Debug, Clone, Default)]
pub struct FsRunStore;

impl FsRunStore {
    pub fn new() -> Self {
        Self
    }
}

/// Run a blocking closure on the blocking pool.
async fn blocking<T, F>(f: F) -> SourceResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SourceResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SourceError::TaskJoin(e.to_string()))?
}

/// Names of the subdirectories of `dir`; empty when `dir` does not exist.
fn subdirectory_names(dir: &Path) -> SourceResult<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SourceError::io(dir, e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SourceError::io(dir, e))?;

        // Skip non-directories
        if !entry.path().is_dir() {
            continue;
        }

        names.push(entry.file_name().to_string_lossy().to_string());
    }

    names.sort();
    Ok(names)
}

/// Read a file that may legitimately be absent.
fn read_optional(path: &Path) -> SourceResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SourceError::io(path, e)),
    }
}

fn yaml_err(path: &Path) -> impl FnOnce(serde_yaml::Error) -> SourceError {
    let path = path.to_path_buf();
    move |source| SourceError::Yaml { path, source }
}

impl RunStore for FsRunStore {
    fn list_experiments<'a>(&'a self, root: &'a Path) -> BoxFuture<'a, SourceResult<Vec<String>>> {
        let root = root.to_path_buf();
        Box::pin(async move { blocking(move || subdirectory_names(&root)).await })
    }

    fn list_runs<'a>(&'a self, experiment_dir: &'a Path) -> BoxFuture<'a, SourceResult<Vec<Uuid>>> {
        let dir = experiment_dir.to_path_buf();
        Box::pin(async move {
            blocking(move || {
                let runs = subdirectory_names(&dir)?
                    .into_iter()
                    .filter_map(|name| match Uuid::parse_str(&name) {
                        Ok(run_id) => Some(run_id),
                        Err(_) => {
                            tracing::debug!(
                                dir = %dir.display(),
                                entry = %name,
                                "Skipping non-run directory"
                            );
                            None
                        }
                    })
                    .collect();
                Ok(runs)
            })
            .await
        })
    }

    fn read_descriptor<'a>(&'a self, paths: &'a RunPaths) -> BoxFuture<'a, SourceResult<RunDescriptor>> {
        let path = paths.descriptor.clone();
        let identity = paths.identity.clone();
        Box::pin(async move {
            blocking(move || {
                let yaml = read_optional(&path)?.ok_or(SourceError::MissingRun(identity))?;
                parse_descriptor(&yaml).map_err(yaml_err(&path))
            })
            .await
        })
    }

    fn disk_usage_bytes<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, SourceResult<u64>> {
        let path: PathBuf = path.to_path_buf();
        Box::pin(async move { blocking(move || Ok(disk_usage_bytes(&path))).await })
    }

    fn latest_values<'a>(
        &'a self,
        paths: &'a RunPaths,
        indicators: &'a [String],
    ) -> BoxFuture<'a, SourceResult<ValueMap>> {
        let db = paths.sqlite.clone();
        let indicators = indicators.to_vec();
        Box::pin(async move { blocking(move || latest_values(&db, &indicators)).await })
    }

    fn indicators<'a>(&'a self, paths: &'a RunPaths) -> BoxFuture<'a, SourceResult<IndicatorMap>> {
        let path = paths.indicators.clone();
        Box::pin(async move {
            blocking(move || match read_optional(&path)? {
                Some(yaml) => parse_indicators(&yaml).map_err(yaml_err(&path)),
                None => Ok(IndicatorMap::new()),
            })
            .await
        })
    }

    fn configs<'a>(&'a self, paths: &'a RunPaths) -> BoxFuture<'a, SourceResult<ConfigMap>> {
        let path = paths.configs.clone();
        Box::pin(async move {
            blocking(move || match read_optional(&path)? {
                Some(yaml) => parse_configs(&yaml).map_err(yaml_err(&path)),
                None => Ok(ConfigMap::new()),
            })
            .await
        })
    }
}

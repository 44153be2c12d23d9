//! Shared setup for commands that read runs.
//!
//! Loads the configuration, applies command-line overrides, installs logging
//! and owns the tokio runtime the cache runs on.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use runwatch::cache::CacheOrchestrator;
use runwatch::config::ConfigFile;
use runwatch::logging::{init_logging, LoggingGuard};
use runwatch::store::FsRunStore;
use tokio::runtime::Runtime;

use crate::error::CliError;

/// Global options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub experiments: Option<PathBuf>,
    pub analytics: Option<PathBuf>,
}

/// Load the config file named by `--config`, or the user's default one, and
/// apply path overrides.
pub fn resolve_config(options: &GlobalOptions) -> Result<ConfigFile, CliError> {
    let mut config = match &options.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };

    if let Some(path) = &options.experiments {
        config.cache.experiments_root = path.clone();
    }
    if let Some(path) = &options.analytics {
        config.cache.analytics_root = path.clone();
    }

    Ok(config)
}

/// Runtime environment of a command.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _logging: LoggingGuard,
}

impl CliRunner {
    pub fn new(options: &GlobalOptions) -> Result<Self, CliError> {
        let config = resolve_config(options)?;
        let logging = init_logging(&config.logging)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            config,
            runtime,
            _logging: logging,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        tracing::info!(
            version = runwatch::VERSION,
            command,
            experiments = %self.config.cache.experiments_root.display(),
            "runwatch starting"
        );
    }

    /// Orchestrator over the configured run directories.
    pub fn orchestrator(&self) -> CacheOrchestrator {
        CacheOrchestrator::new(Arc::new(FsRunStore::new()), &self.config.cache)
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

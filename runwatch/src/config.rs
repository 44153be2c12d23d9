//! Configuration file and settings.
//!
//! Settings live in an INI file at `~/.runwatch/config.ini`. Every key is
//! optional; missing keys keep their defaults and unknown keys are ignored.
//!
//! ```ini
//! [paths]
//! experiments = /data/logs
//! analytics = /data/analytics
//!
//! [index]
//! min_delay_ms = 1000
//! max_delay_ms = 15000
//! growth = 2.0
//!
//! [snapshot]
//! min_delay_ms = 2000
//! max_delay_ms = 300000
//! growth = 1.5
//!
//! [logging]
//! level = info
//! directory = /var/log/runwatch
//! ```

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::cache::DelayPolicy;
use crate::store::RunLayout;

/// Directory under the home directory holding runwatch files.
pub const CONFIG_DIR_NAME: &str = ".runwatch";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Could not determine home directory")]
    NoHomeDirectory,
}

/// Path of the user's configuration file.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDirectory`] if the home directory is unknown.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoHomeDirectory)
}

/// Settings of the cache orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Directory holding one subdirectory per experiment.
    pub experiments_root: PathBuf,

    /// Directory holding per-run analytics output.
    pub analytics_root: PathBuf,

    /// Delay policy of the run index.
    pub index_policy: DelayPolicy,

    /// Delay policy of each run snapshot.
    pub snapshot_policy: DelayPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            experiments_root: PathBuf::from("logs"),
            analytics_root: PathBuf::from("analytics"),
            index_policy: DelayPolicy::INDEX_DEFAULT,
            snapshot_policy: DelayPolicy::SNAPSHOT_DEFAULT,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with default delay policies.
    pub fn new(experiments_root: impl Into<PathBuf>, analytics_root: impl Into<PathBuf>) -> Self {
        Self {
            experiments_root: experiments_root.into(),
            analytics_root: analytics_root.into(),
            ..Default::default()
        }
    }

    pub fn with_experiments_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.experiments_root = path.into();
        self
    }

    pub fn with_analytics_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.analytics_root = path.into();
        self
    }

    /// Set the run index delay policy.
    pub fn with_index_policy(mut self, policy: DelayPolicy) -> Self {
        self.index_policy = policy;
        self
    }

    /// Set the run snapshot delay policy.
    pub fn with_snapshot_policy(mut self, policy: DelayPolicy) -> Self {
        self.snapshot_policy = policy;
        self
    }

    /// Path layout of the configured roots.
    pub fn layout(&self) -> RunLayout {
        RunLayout::new(&self.experiments_root, &self.analytics_root)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,

    /// Directory for daily log files; stderr only when `None`.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Load the user's configuration file, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the home directory is unknown, the file is unreadable, or a
    /// value is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path()?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from an INI file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read or parsed and
    /// [`ConfigError::InvalidValue`] for malformed values.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ini(&ini)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Build settings from parsed INI sections.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(paths) = ini.section(Some("paths")) {
            if let Some(v) = paths.get("experiments") {
                config.cache.experiments_root = PathBuf::from(v);
            }
            if let Some(v) = paths.get("analytics") {
                config.cache.analytics_root = PathBuf::from(v);
            }
        }

        if let Some(section) = ini.section(Some("index")) {
            config.cache.index_policy = parse_policy("index", section, config.cache.index_policy)?;
        }
        if let Some(section) = ini.section(Some("snapshot")) {
            config.cache.snapshot_policy =
                parse_policy("snapshot", section, config.cache.snapshot_policy)?;
        }

        if let Some(logging) = ini.section(Some("logging")) {
            if let Some(v) = logging.get("level") {
                config.logging.level = v.to_string();
            }
            if let Some(v) = logging.get("directory") {
                config.logging.directory = Some(PathBuf::from(v));
            }
        }

        Ok(config)
    }

    /// Effective settings as INI sections.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("paths"))
            .set("experiments", self.cache.experiments_root.display().to_string())
            .set("analytics", self.cache.analytics_root.display().to_string());
        write_policy(&mut ini, "index", &self.cache.index_policy);
        write_policy(&mut ini, "snapshot", &self.cache.snapshot_policy);
        ini.with_section(Some("logging"))
            .set("level", self.logging.level.as_str());
        if let Some(dir) = &self.logging.directory {
            ini.with_section(Some("logging"))
                .set("directory", dir.display().to_string());
        }
        ini
    }
}

fn parse_value<T>(section: &str, key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: format!("{}.{}", section, key),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_policy(
    section: &str,
    props: &Properties,
    defaults: DelayPolicy,
) -> Result<DelayPolicy, ConfigError> {
    let min = match props.get("min_delay_ms") {
        Some(v) => Duration::from_millis(parse_value(section, "min_delay_ms", v)?),
        None => defaults.min(),
    };
    let max = match props.get("max_delay_ms") {
        Some(v) => Duration::from_millis(parse_value(section, "max_delay_ms", v)?),
        None => defaults.max(),
    };
    let growth = match props.get("growth") {
        Some(v) => parse_value(section, "growth", v)?,
        None => defaults.growth(),
    };

    DelayPolicy::new(min, max, growth).map_err(|e| ConfigError::InvalidValue {
        key: section.to_string(),
        value: format!(
            "min_delay_ms={} max_delay_ms={} growth={}",
            min.as_millis(),
            max.as_millis(),
            growth
        ),
        reason: e.to_string(),
    })
}

fn write_policy(ini: &mut Ini, section: &str, policy: &DelayPolicy) {
    ini.with_section(Some(section))
        .set("min_delay_ms", policy.min().as_millis().to_string())
        .set("max_delay_ms", policy.max().as_millis().to_string())
        .set("growth", policy.growth().to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let config = ConfigFile::default();
        assert_eq!(config.cache.index_policy.min(), Duration::from_secs(1));
        assert_eq!(config.cache.index_policy.max(), Duration::from_secs(15));
        assert_eq!(config.cache.snapshot_policy.min(), Duration::from_secs(2));
        assert_eq!(config.cache.snapshot_policy.max(), Duration::from_secs(300));
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_load_full_file() {
        let (_dir, path) = write_config(
            "[paths]\n\
             experiments = /data/logs\n\
             analytics = /data/analytics\n\
             [index]\n\
             min_delay_ms = 500\n\
             max_delay_ms = 5000\n\
             growth = 3.0\n\
             [logging]\n\
             level = debug\n\
             directory = /tmp/runwatch\n",
        );

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.cache.experiments_root, PathBuf::from("/data/logs"));
        assert_eq!(config.cache.analytics_root, PathBuf::from("/data/analytics"));
        assert_eq!(config.cache.index_policy.min(), Duration::from_millis(500));
        assert_eq!(config.cache.index_policy.max(), Duration::from_secs(5));
        assert_eq!(config.cache.index_policy.growth(), 3.0);
        assert_eq!(config.cache.snapshot_policy, DelayPolicy::SNAPSHOT_DEFAULT);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.directory, Some(PathBuf::from("/tmp/runwatch")));
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let (_dir, path) = write_config("[snapshot]\nmax_delay_ms = 60000\nunknown = 1\n");

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.cache.snapshot_policy.min(), Duration::from_secs(2));
        assert_eq!(config.cache.snapshot_policy.max(), Duration::from_secs(60));
        assert_eq!(config.cache.snapshot_policy.growth(), 1.5);
    }

    #[test]
    fn test_malformed_number_is_invalid() {
        let (_dir, path) = write_config("[index]\nmin_delay_ms = soon\n");

        match ConfigFile::load_from(&path) {
            Err(ConfigError::InvalidValue { key, value, .. }) => {
                assert_eq!(key, "index.min_delay_ms");
                assert_eq!(value, "soon");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let (_dir, path) = write_config("[index]\ngrowth = 1.0\n");
        assert!(matches!(
            ConfigFile::load_from(&path),
            Err(ConfigError::InvalidValue { key, .. }) if key == "index"
        ));

        let (_dir, path) = write_config("[snapshot]\nmin_delay_ms = 9000\nmax_delay_ms = 1000\n");
        assert!(matches!(
            ConfigFile::load_from(&path),
            Err(ConfigError::InvalidValue { key, .. }) if key == "snapshot"
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let result = ConfigFile::load_from(&dir.path().join("absent.ini"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_to_ini_reloads_to_same_settings() {
        let config = ConfigFile {
            cache: CacheConfig::new("/a", "/b"),
            logging: LoggingConfig::default().with_directory("/logs"),
        };
        assert_eq!(ConfigFile::from_ini(&config.to_ini()).unwrap(), config);
    }

    #[test]
    fn test_cache_config_builders() {
        let policy = DelayPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 4.0).unwrap();
        let config = CacheConfig::default()
            .with_experiments_root("/x")
            .with_analytics_root("/y")
            .with_index_policy(policy);

        assert_eq!(config.index_policy, policy);
        assert_eq!(config.layout().experiments_root(), Path::new("/x"));
        assert_eq!(config.layout().analytics_root(), Path::new("/y"));
    }

    #[test]
    fn test_config_file_path() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with(".runwatch/config.ini"));
        }
    }
}

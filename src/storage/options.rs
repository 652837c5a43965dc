use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitives::pager::{Pager, PagerOptions};
use crate::types::IndexError;

use super::btree::{BTree, BTreeOptions};

/// Default tracing filter used when none is configured.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Top-level configuration for one index and the page store beneath it.
///
/// ```toml
/// [pager]
/// page_size = 4096
///
/// [btree]
/// index_name = "users_by_email"
/// max_entries_per_bucket = 64
///
/// [logging]
/// level = "sombra_index=debug"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Page store settings.
    pub pager: PagerOptions,
    /// Index settings.
    pub btree: BTreeOptions,
    /// Tracing subscriber settings.
    pub logging: LoggingConfig,
}

/// Settings for [`crate::logging::init_logging`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string, e.g. `info` or `sombra_index::btree=trace`.
    pub level: String,
    /// Emit ANSI colors.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_owned(),
            ansi: false,
        }
    }
}

impl IndexConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            origin: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            origin: "inline config".to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges the TOML schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pager.validate().map_err(ConfigError::Invalid)?;
        self.btree.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    /// Creates the page store and an initialized, empty index on it.
    pub fn open(&self) -> crate::types::Result<(Pager, BTree)> {
        let pager = Pager::new(self.pager.clone())?;
        let tree = BTree::with_catalog(&pager, self.btree.clone())?;
        let mut write = pager.begin_write()?;
        tree.init_as_empty(&mut write)?;
        pager.commit(write)?;
        Ok((pager, tree))
    }
}

/// Errors raised while loading configuration or installing the subscriber.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read index config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config text is not valid TOML for [`IndexConfig`].
    #[error("failed to parse index config {origin}: {source}")]
    Parse {
        /// File path, or a label for inline text.
        origin: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// A value is outside its supported range.
    #[error("invalid index config: {0}")]
    Invalid(#[source] IndexError),
    /// The tracing filter is malformed or a global subscriber is already installed.
    #[error("failed to initialize logging with filter '{filter}': {reason}")]
    Logging {
        /// Filter directive that was requested.
        filter: String,
        /// Why installation failed.
        reason: String,
    },
}

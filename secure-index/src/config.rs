//! Manager configuration.
//!
//! `ManagerConfig` captures where trust metadata lives and how indexes lay
//! out their metadata. Every field has a default, so an empty TOML document
//! is a valid configuration; unknown keys are rejected so that typos surface
//! instead of silently falling back.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

use crate::fetcher::HttpFetcher;

/// Errors arising while reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}")]
    Read {
        /// The file that was read.
        path: Utf8PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or does not match the schema.
    #[error("invalid configuration: {reason}")]
    Parse {
        /// The parser's description of the problem.
        reason: String,
    },

    /// A field holds a value outside its accepted range.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Description of the violated constraint.
        reason: String,
    },
}

/// Settings for [`crate::manager::RepositoryManager`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Directory holding persistent trust metadata. When absent, a temporary
    /// directory owned by the manager is used for the lifetime of the
    /// process.
    pub data_dir: Option<Utf8PathBuf>,
    /// Directory of shipped root metadata, one `<name>/root.json` per index.
    /// When absent, no bootstrapping takes place.
    pub bootstrap_dir: Option<Utf8PathBuf>,
    /// Path below the index host serving trust metadata.
    pub metadata_path: String,
    /// Name of the directory below `data_dir` holding per-index metadata.
    pub trust_dir_name: String,
    /// Whole-request timeout for the HTTP fetcher, in seconds.
    pub timeout_secs: u64,
}

impl ManagerConfig {
    const DEFAULT_METADATA_PATH: &'static str = "tuf/";
    const DEFAULT_TRUST_DIR_NAME: &'static str = "trust";
    const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Parse configuration from a TOML document.
    ///
    /// # Examples
    ///
    /// ```
    /// use secure_index::config::ManagerConfig;
    ///
    /// let config = ManagerConfig::from_toml_str("data_dir = \"/var/lib/pkg\"\n").unwrap();
    /// assert_eq!(config.data_dir.as_deref().map(|p| p.as_str()), Some("/var/lib/pkg"));
    /// assert_eq!(config.metadata_path, "tuf/");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] when a value fails validation.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Use `dir` for persistent trust metadata.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Bootstrap trust metadata from the shipped roots in `dir`.
    #[must_use]
    pub fn with_bootstrap_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.bootstrap_dir = Some(dir.into());
        self
    }

    /// Return the configured request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build an HTTP fetcher honouring the configured timeout.
    #[must_use]
    pub fn http_fetcher(&self) -> HttpFetcher {
        HttpFetcher::with_timeout(self.timeout())
    }

    /// Check field values that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the trust directory name is empty
    /// or not a single path component, or the timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.trust_dir_name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ConfigError::Invalid {
                field: "trust_dir_name",
                reason: format!("\"{name}\" is not a single directory name"),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout_secs",
                reason: "must be at least one second".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            bootstrap_dir: None,
            metadata_path: Self::DEFAULT_METADATA_PATH.to_owned(),
            trust_dir_name: Self::DEFAULT_TRUST_DIR_NAME.to_owned(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }
}

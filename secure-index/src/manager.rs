//! Registry of secure repositories keyed by index URL.
//!
//! The manager is built once per installer run. It bootstraps shipped root
//! metadata into the data directory, opens a [`Repository`] for every index
//! that has local trust metadata, and routes project URLs to the repository
//! of their index. Indexes without metadata are served insecurely by the
//! caller, except for the known-secure indexes, whose absence is a
//! configuration error.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use log::debug;
use tempfile::TempDir;

use crate::bootstrap::bootstrap_metadata;
use crate::config::ManagerConfig;
use crate::error::{RepositoryError, Result};
use crate::fetcher::Fetcher;
use crate::index_url::{IndexUrl, split_project_url};
use crate::repository::Repository;
use crate::trust::{TrustEngineFactory, TrustError};

pub use crate::index_url::canonicalize_url;

/// Indexes that must never be used without trust metadata.
const KNOWN_SECURE_INDEXES: &[&str] = &["http://localhost:8000/simple/"];

/// Return whether `index_url` is one of [`KNOWN_SECURE_INDEXES`].
#[must_use]
fn is_known_secure(index_url: &IndexUrl) -> bool {
    KNOWN_SECURE_INDEXES
        .iter()
        .any(|known| canonicalize_url(known) == index_url.as_str())
}

/// Secure repositories for the configured indexes.
#[derive(Debug)]
pub struct RepositoryManager {
    repositories: IndexMap<IndexUrl, Repository>,
    trust_dir: Utf8PathBuf,
    // Holds the data directory alive when none was configured.
    _scratch: Option<TempDir>,
}

impl RepositoryManager {
    /// Build the manager for `index_urls`.
    ///
    /// URLs are canonicalised and de-duplicated, keeping the first spelling's
    /// position. An index without local trust metadata is skipped unless it
    /// is known-secure.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Config`] for invalid settings,
    /// [`RepositoryError::Bootstrap`] if shipped roots cannot be copied,
    /// [`RepositoryError::MissingTrustMetadata`] for a known-secure index
    /// without metadata, and [`RepositoryError::TrustConfiguration`] when
    /// existing metadata cannot be loaded.
    pub fn new<S: AsRef<str>>(
        config: &ManagerConfig,
        index_urls: &[S],
        fetcher: Arc<dyn Fetcher>,
        factory: &dyn TrustEngineFactory,
    ) -> Result<Self> {
        config.validate()?;
        let (data_dir, scratch) = data_dir(config)?;
        let trust_dir = data_dir.join(&config.trust_dir_name);
        std::fs::create_dir_all(&trust_dir).map_err(|source| RepositoryError::Bootstrap {
            path: trust_dir.clone(),
            source,
        })?;
        if let Some(bootstrap_dir) = &config.bootstrap_dir {
            bootstrap_metadata(bootstrap_dir, &trust_dir)?;
        }

        let mut repositories = IndexMap::new();
        for raw in index_urls {
            let index_url = IndexUrl::new(raw.as_ref());
            if repositories.contains_key(&index_url) {
                continue;
            }
            let repository_dir = trust_dir.join(index_url.metadata_dir_name());
            match factory.open(&index_url, &repository_dir, Arc::clone(&fetcher)) {
                Ok(engine) => {
                    let repository =
                        Repository::new(index_url.clone(), &config.metadata_path, engine)?;
                    repositories.insert(index_url, repository);
                }
                Err(TrustError::MissingLocalMetadata { .. }) if is_known_secure(&index_url) => {
                    return Err(RepositoryError::MissingTrustMetadata { index_url });
                }
                Err(TrustError::MissingLocalMetadata { path }) => {
                    debug!("No trust metadata for {index_url} in {path}; index is not secure");
                }
                Err(source) => {
                    return Err(RepositoryError::TrustConfiguration { index_url, source });
                }
            }
        }

        Ok(Self {
            repositories,
            trust_dir,
            _scratch: scratch,
        })
    }

    /// Return the repository serving `project_url` and the project name.
    ///
    /// The repository is `None` when the index has no trust metadata; the
    /// caller then falls back to an unverified download.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidProjectUrl`] if the URL has no
    /// project segment and [`RepositoryError::MissingSecureRepository`] if a
    /// known-secure index has no repository.
    pub fn repository(
        &mut self,
        project_url: &str,
    ) -> Result<(Option<&mut Repository>, String)> {
        let (index_url, project) = split_project_url(project_url)?;
        if !self.repositories.contains_key(&index_url) && is_known_secure(&index_url) {
            return Err(RepositoryError::MissingSecureRepository { index_url });
        }
        Ok((self.repositories.get_mut(&index_url), project))
    }

    /// Return the repository for `index_url`, in any spelling.
    #[must_use]
    pub fn get(&self, index_url: &str) -> Option<&Repository> {
        self.repositories.get(&IndexUrl::new(index_url))
    }

    /// Canonical URLs of the secured indexes, in configuration order.
    pub fn index_urls(&self) -> impl Iterator<Item = &IndexUrl> {
        self.repositories.keys()
    }

    /// Number of secured indexes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    /// Return whether no index is secured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// Directory holding one metadata directory per index.
    #[must_use]
    pub fn trust_dir(&self) -> &Utf8Path {
        &self.trust_dir
    }
}

fn data_dir(config: &ManagerConfig) -> Result<(Utf8PathBuf, Option<TempDir>)> {
    if let Some(dir) = &config.data_dir {
        return Ok((dir.clone(), None));
    }
    let scratch = tempfile::Builder::new().prefix("secure-index-data-").tempdir()?;
    let path = Utf8PathBuf::try_from(scratch.path().to_path_buf())
        .map_err(|e| RepositoryError::Io(e.into_io_error()))?;
    debug!("No data directory configured; using {path}");
    Ok((path, Some(scratch)))
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

//! One index's refresh and download orchestration.
//!
//! A [`Repository`] owns the trust engine for a single index. It refreshes
//! the top-level metadata lazily and exactly once, derives target names for
//! index pages and distribution links, and hands the verified download to the
//! engine.
//!
//! Index pages and distributions fail differently on purpose. An index page
//! that cannot be fetched is reported as not found, because resolution may
//! still succeed against another index. A distribution link that cannot be
//! fetched is a [`RepositoryError::Connectivity`] error, because the link
//! implies the artefact exists. Trust failures are never downgraded in
//! either path.
//!
//! All operations take `&mut self`: one repository has one caller at a time,
//! which is what makes the one-shot refresh sound without atomics.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use tempfile::TempDir;

use crate::distribution::{DistributionTarget, split_distribution_url};
use crate::error::{RepositoryError, Result};
use crate::index_url::IndexUrl;
use crate::mirror::{MirrorConfig, MirrorSet};
use crate::progress::ProgressMode;
use crate::trust::{DownloadOptions, TargetName, TrustEngine, TrustError};

/// File name of a project's index page below its project directory.
const INDEX_PAGE: &str = "index.html";

/// Whether the top-level metadata has been refreshed.
#[derive(Debug)]
enum Freshness {
    /// No refresh attempted yet.
    Stale,
    /// Refreshed successfully; never refreshed again.
    Fresh,
    /// The one refresh failed; every later operation reports this cause.
    Failed(TrustError),
}

/// The outcome of looking up a project's index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLookup {
    /// The verified index page.
    Found(Vec<u8>),
    /// Trust metadata does not list the project.
    NotFound,
    /// No mirror could serve the metadata or the page.
    Unavailable {
        /// Description of the transport failure.
        reason: String,
    },
}

impl IndexLookup {
    /// Return the page, collapsing both absent outcomes to `None`.
    #[must_use]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Found(bytes) => Some(bytes),
            Self::NotFound | Self::Unavailable { .. } => None,
        }
    }
}

/// Verified downloads from a single index.
pub struct Repository {
    index_url: IndexUrl,
    index_mirrors: MirrorSet,
    distribution_mirrors: MirrorSet,
    freshness: Freshness,
    engine: Box<dyn TrustEngine>,
    temp_path: Utf8PathBuf,
    // Index pages are written here; removed when the repository is dropped.
    _temp_dir: TempDir,
}

impl Repository {
    /// Create the repository for `index_url`.
    ///
    /// The index host serves metadata below `metadata_path` and index pages
    /// below the index URL's own path. Distribution hosts start out empty and
    /// are registered as links are followed.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidIndexUrl`] if the URL has no host
    /// and [`RepositoryError::Io`] if the temporary directory cannot be
    /// created.
    pub fn new(
        index_url: IndexUrl,
        metadata_path: &str,
        engine: Box<dyn TrustEngine>,
    ) -> Result<Self> {
        let (origin, targets_path) = index_url.origin_and_path()?;
        let mut index_mirrors = MirrorSet::new();
        index_mirrors.register(
            MirrorConfig::new(origin.clone())
                .with_metadata_path(metadata_path)
                .with_targets_path(targets_path),
        );
        let mut distribution_mirrors = MirrorSet::new();
        distribution_mirrors.register(MirrorConfig::new(origin).with_metadata_path(metadata_path));

        let temp_dir = tempfile::Builder::new()
            .prefix("secure-index-")
            .tempdir()?;
        let temp_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf())
            .map_err(|e| RepositoryError::Io(e.into_io_error()))?;

        Ok(Self {
            index_url,
            index_mirrors,
            distribution_mirrors,
            freshness: Freshness::Stale,
            engine,
            temp_path,
            _temp_dir: temp_dir,
        })
    }

    /// Return the canonical index URL.
    #[must_use]
    pub const fn index_url(&self) -> &IndexUrl {
        &self.index_url
    }

    /// Mirrors used for metadata refreshes and index pages.
    #[must_use]
    pub const fn index_mirrors(&self) -> &MirrorSet {
        &self.index_mirrors
    }

    /// Mirrors used for distribution downloads.
    #[must_use]
    pub const fn distribution_mirrors(&self) -> &MirrorSet {
        &self.distribution_mirrors
    }

    /// Return whether the one metadata refresh has succeeded.
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        matches!(self.freshness, Freshness::Fresh)
    }

    /// Register `mirror_base` as a distribution host.
    ///
    /// Distribution hosts serve targets directly below the base and no
    /// metadata. Returns whether the base was new; registering a base twice
    /// leaves a single entry.
    pub fn register_distribution_mirror(&mut self, mirror_base: &str) -> bool {
        self.distribution_mirrors
            .register(MirrorConfig::new(mirror_base).with_targets_path(""))
    }

    /// Refresh the top-level trust metadata unless already done.
    ///
    /// Only the first call reaches the trust engine. If that refresh fails,
    /// the failure is kept and returned by every later call without retrying.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Connectivity`] when no mirror could be
    /// reached and [`RepositoryError::Trust`] when verification failed.
    pub fn ensure_fresh_metadata(&mut self) -> Result<()> {
        self.refresh_once().map_err(|e| self.classify(e))
    }

    /// Download the verified index page for `project_name`.
    ///
    /// Returns `Ok(None)` both when the project does not exist and when the
    /// index cannot be reached; see [`Self::lookup_index`] to tell the two
    /// apart.
    ///
    /// # Errors
    ///
    /// Returns an error only for an unusable project name, a trust
    /// verification failure, or a local I/O failure.
    pub fn download_index(&mut self, project_name: &str) -> Result<Option<Vec<u8>>> {
        self.lookup_index(project_name).map(IndexLookup::into_bytes)
    }

    /// Look up the verified index page for `project_name`.
    ///
    /// Transport failures, including a failed metadata refresh, are logged as
    /// warnings and reported as [`IndexLookup::Unavailable`].
    ///
    /// # Errors
    ///
    /// As [`Self::download_index`].
    pub fn lookup_index(&mut self, project_name: &str) -> Result<IndexLookup> {
        let target_name = index_target_name(project_name)?;
        match self.fetch_index(&target_name) {
            Ok(Some(bytes)) => Ok(IndexLookup::Found(bytes)),
            Ok(None) => {
                debug!("Index for {project_name} not found");
                Ok(IndexLookup::NotFound)
            }
            Err(e) if e.is_transport() => {
                warn!("Failed to download index for {project_name}: {e}");
                Ok(IndexLookup::Unavailable {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(self.classify(e)),
        }
    }

    /// Download the distribution behind `link` into `destination_dir`.
    ///
    /// The link is validated before any network access. The returned path
    /// keeps the hash directories of the target name, e.g.
    /// `<destination_dir>/8f/1f/74aa…/Django-1.1.3.tar.gz`. A copy already
    /// present and verified is reused.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidDistributionLink`] for a link
    /// without a content-hash path, [`RepositoryError::UnknownDistribution`]
    /// when trust metadata does not list the target,
    /// [`RepositoryError::Connectivity`] for any transport failure, and
    /// [`RepositoryError::Trust`] for verification failures.
    pub fn download_distribution(
        &mut self,
        link: &str,
        destination_dir: &Utf8Path,
        progress: ProgressMode,
    ) -> Result<Utf8PathBuf> {
        let target = split_distribution_url(link)?;
        self.ensure_fresh_metadata()?;
        self.register_distribution_mirror(target.mirror_base());

        let name = target.target_name().clone();
        match self.fetch_distribution(&target, destination_dir, progress) {
            Ok(Some(path)) => Ok(path),
            Ok(None) => Err(RepositoryError::UnknownDistribution {
                index_url: self.index_url.clone(),
                target: name,
            }),
            Err(e) => Err(self.classify(e)),
        }
    }

    fn refresh_once(&mut self) -> std::result::Result<(), TrustError> {
        match &self.freshness {
            Freshness::Fresh => Ok(()),
            Freshness::Failed(cause) => Err(cause.clone()),
            Freshness::Stale => {
                let outcome = self.engine.refresh(&self.index_mirrors);
                self.freshness = match &outcome {
                    Ok(()) => Freshness::Fresh,
                    Err(e) => Freshness::Failed(e.clone()),
                };
                outcome
            }
        }
    }

    fn fetch_index(
        &mut self,
        target_name: &TargetName,
    ) -> std::result::Result<Option<Vec<u8>>, TrustError> {
        self.refresh_once()?;
        let Some(target) = self.engine.target_info(target_name, &self.index_mirrors)? else {
            return Ok(None);
        };

        let options = DownloadOptions::index();
        let cached = self
            .engine
            .cached_target(&target, &self.temp_path, options)?;
        let path = cached.map_or_else(
            || {
                self.engine
                    .download_target(&target, &self.temp_path, &self.index_mirrors, options)
            },
            Ok,
        )?;
        Ok(Some(std::fs::read(&path)?))
    }

    fn fetch_distribution(
        &mut self,
        target: &DistributionTarget,
        destination_dir: &Utf8Path,
        progress: ProgressMode,
    ) -> std::result::Result<Option<Utf8PathBuf>, TrustError> {
        let name = target.target_name();
        debug!("Fetching metadata for {name}");
        let Some(descriptor) = self.engine.target_info(name, &self.distribution_mirrors)? else {
            return Ok(None);
        };

        let options = DownloadOptions::distribution(progress);
        if let Some(path) = self
            .engine
            .cached_target(&descriptor, destination_dir, options)?
        {
            info!("Already downloaded {}", name.file_name());
            return Ok(Some(path));
        }
        info!("Downloading {}", name.file_name());
        self.engine
            .download_target(
                &descriptor,
                destination_dir,
                &self.distribution_mirrors,
                options,
            )
            .map(Some)
    }

    fn classify(&self, error: TrustError) -> RepositoryError {
        let index_url = self.index_url.clone();
        if error.is_transport() {
            RepositoryError::Connectivity {
                index_url,
                source: error,
            }
        } else {
            RepositoryError::Trust {
                index_url,
                source: error,
            }
        }
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("index_url", &self.index_url)
            .field("index_mirrors", &self.index_mirrors)
            .field("distribution_mirrors", &self.distribution_mirrors)
            .field("freshness", &self.freshness)
            .finish_non_exhaustive()
    }
}

/// Target name of the index page for `project_name`.
///
/// # Errors
///
/// Returns [`RepositoryError::InvalidProjectName`] if the name is empty or
/// would escape the project directory.
pub fn index_target_name(project_name: &str) -> Result<TargetName> {
    TargetName::new(format!("{project_name}/{INDEX_PAGE}")).map_err(|e| {
        RepositoryError::InvalidProjectName {
            name: project_name.to_owned(),
            reason: e.reason.to_owned(),
        }
    })
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;

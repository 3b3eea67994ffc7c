//! Trust engine capability.
//!
//! The cryptographic trust protocol (signature checks, delegations, root
//! rotation) lives behind [`TrustEngine`]. A [`crate::repository::Repository`]
//! only ever asks it to refresh top-level metadata, resolve a target name, and
//! perform a verified download. Engines own the [`Fetcher`] they were opened
//! with.
//!
//! Engines fetch metadata with [`ProgressMode::Off`]; only artefact bodies use
//! the progress mode carried in [`DownloadOptions`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::fetcher::{FetchError, Fetcher};
use crate::index_url::IndexUrl;
use crate::mirror::MirrorSet;
use crate::progress::ProgressMode;

/// Hash algorithm preferred when prefixing local filenames.
const PREFERRED_HASH: &str = "sha256";

/// A validated, `/`-separated relative target name such as
/// `foo/index.html` or `8f/1f/74aa…/Django-1.1.3.tar.gz`.
///
/// # Examples
///
/// ```
/// use secure_index::trust::TargetName;
///
/// let name = TargetName::new("foo/index.html").unwrap();
/// assert_eq!(name.file_name(), "index.html");
/// assert!(TargetName::new("../etc/passwd").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetName(String);

/// A target name violated one of the [`TargetName`] constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid target name \"{name}\": {reason}")]
pub struct InvalidTargetName {
    /// The rejected name.
    pub name: String,
    /// The violated constraint.
    pub reason: &'static str,
}

impl TargetName {
    /// Validate and wrap `name`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTargetName`] if the name is empty, absolute, contains
    /// a backslash, or has an empty, `.` or `..` segment.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidTargetName> {
        let name = raw.into();
        let violation = if name.is_empty() {
            Some("name is empty")
        } else if name.starts_with('/') {
            Some("name must be relative")
        } else if name.contains('\\') {
            Some("name must use '/' separators")
        } else if name.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            Some("name has an empty or relative segment")
        } else {
            None
        };
        if let Some(reason) = violation {
            return Err(InvalidTargetName { name, reason });
        }
        Ok(Self(name))
    }

    /// Return the full target name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the final segment of the name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Return everything in front of the final segment, if anything.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(parent, _)| parent)
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verified description of a target, as recorded in trust metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    name: TargetName,
    length: u64,
    hashes: BTreeMap<String, String>,
}

impl TargetDescriptor {
    /// Describe `name` with the given length in bytes.
    #[must_use]
    pub fn new(name: TargetName, length: u64) -> Self {
        Self {
            name,
            length,
            hashes: BTreeMap::new(),
        }
    }

    /// Record a hex digest for `algorithm`.
    #[must_use]
    pub fn with_hash(mut self, algorithm: &str, hex: &str) -> Self {
        self.hashes.insert(algorithm.to_owned(), hex.to_owned());
        self
    }

    /// Return the target name.
    #[must_use]
    pub const fn name(&self) -> &TargetName {
        &self.name
    }

    /// Return the length in bytes recorded in metadata.
    #[must_use]
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// Return the recorded digest for `algorithm`.
    #[must_use]
    pub fn hash(&self, algorithm: &str) -> Option<&str> {
        self.hashes.get(algorithm).map(String::as_str)
    }

    /// Where this target lives below `dest_dir`.
    ///
    /// With `prefix_with_hash` the file name becomes `<digest>.<name>`, using
    /// the SHA-256 digest when recorded and otherwise the first digest in
    /// algorithm order. Sub-directories of the target name are kept.
    #[must_use]
    pub fn local_path(&self, dest_dir: &Utf8Path, prefix_with_hash: bool) -> Utf8PathBuf {
        let digest = self
            .hash(PREFERRED_HASH)
            .or_else(|| self.hashes.values().next().map(String::as_str))
            .filter(|_| prefix_with_hash);
        let file_name = digest.map_or_else(
            || self.name.file_name().to_owned(),
            |hex| format!("{hex}.{}", self.name.file_name()),
        );
        self.name.parent().map_or_else(
            || dest_dir.join(&file_name),
            |parent| dest_dir.join(parent).join(&file_name),
        )
    }
}

/// Per-call download settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Store the target as `<digest>.<file name>`.
    pub prefix_filename_with_hash: bool,
    /// Progress reporting for the target body.
    pub progress: ProgressMode,
}

impl DownloadOptions {
    /// Settings for index pages: hash-prefixed names, no progress.
    #[must_use]
    pub const fn index() -> Self {
        Self {
            prefix_filename_with_hash: true,
            progress: ProgressMode::Off,
        }
    }

    /// Settings for distributions: plain names, caller-chosen progress.
    #[must_use]
    pub const fn distribution(progress: ProgressMode) -> Self {
        Self {
            prefix_filename_with_hash: false,
            progress,
        }
    }
}

/// One mirror's failure while fetching a resource.
#[derive(Debug, Clone)]
pub struct MirrorFailure {
    /// The URL that was requested.
    pub url: String,
    /// What went wrong.
    pub error: FetchError,
}

/// Errors reported by a [`TrustEngine`].
#[derive(Debug, Error)]
pub enum TrustError {
    /// The repository directory holds no trust metadata at all.
    #[error("no local trust metadata found in {path}")]
    MissingLocalMetadata {
        /// The repository directory that was inspected.
        path: Utf8PathBuf,
    },

    /// Trust metadata is corrupt, unsigned, or failed verification.
    #[error("trust metadata rejected: {reason}")]
    Repository {
        /// Description of the rejection.
        reason: String,
    },

    /// A downloaded target did not match its recorded length or digest.
    #[error("target {name} failed verification: {reason}")]
    TargetVerification {
        /// The target name.
        name: String,
        /// Description of the mismatch.
        reason: String,
    },

    /// Every mirror failed to serve a resource.
    #[error("no working mirror for {resource}{}", describe_failures(.errors))]
    NoWorkingMirror {
        /// The metadata file or target that was requested.
        resource: String,
        /// One entry per mirror attempted.
        errors: Vec<MirrorFailure>,
    },

    /// A local I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrustError {
    /// Return whether this error stems from the network rather than from
    /// the metadata or the local disk.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::NoWorkingMirror { .. })
    }
}

impl Clone for TrustError {
    fn clone(&self) -> Self {
        match self {
            Self::MissingLocalMetadata { path } => {
                Self::MissingLocalMetadata { path: path.clone() }
            }
            Self::Repository { reason } => Self::Repository {
                reason: reason.clone(),
            },
            Self::TargetVerification { name, reason } => Self::TargetVerification {
                name: name.clone(),
                reason: reason.clone(),
            },
            Self::NoWorkingMirror { resource, errors } => Self::NoWorkingMirror {
                resource: resource.clone(),
                errors: errors.clone(),
            },
            // Lossy: std::io::Error cannot be cloned, so only the kind and
            // message survive.
            Self::Io(source) => Self::Io(std::io::Error::new(source.kind(), source.to_string())),
        }
    }
}

fn describe_failures(errors: &[MirrorFailure]) -> String {
    errors
        .iter()
        .map(|failure| format!("; {}: {}", failure.url, failure.error))
        .collect()
}

/// The trust protocol as seen by a repository.
///
/// Implementations verify everything they return: a descriptor from
/// [`target_info`](Self::target_info) is backed by current signed metadata,
/// and [`download_target`](Self::download_target) only leaves a file behind
/// once its length and digest match. Every request goes through the
/// [`Fetcher`] the engine was opened with.
#[cfg_attr(test, mockall::automock)]
pub trait TrustEngine {
    /// Fetch and verify the top-level metadata chain from `mirrors`.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Repository`] when verification fails and
    /// [`TrustError::NoWorkingMirror`] when no mirror could be reached.
    fn refresh(&mut self, mirrors: &MirrorSet) -> Result<(), TrustError>;

    /// Resolve `name` against current metadata.
    ///
    /// Returns `Ok(None)` when the metadata does not list the target. May
    /// fetch delegated metadata from `mirrors`.
    ///
    /// # Errors
    ///
    /// Returns an error when delegated metadata cannot be fetched or
    /// verified.
    fn target_info(
        &mut self,
        name: &TargetName,
        mirrors: &MirrorSet,
    ) -> Result<Option<TargetDescriptor>, TrustError>;

    /// Return the path of an already verified copy of `target` below
    /// `dest_dir`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Io`] if an existing file cannot be read.
    fn cached_target(
        &self,
        target: &TargetDescriptor,
        dest_dir: &Utf8Path,
        options: DownloadOptions,
    ) -> Result<Option<Utf8PathBuf>, TrustError>;

    /// Download `target` from `mirrors` into `dest_dir`, verifying it, and
    /// return the path written.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::NoWorkingMirror`] if every mirror fails and
    /// [`TrustError::TargetVerification`] if the body does not match.
    fn download_target(
        &mut self,
        target: &TargetDescriptor,
        dest_dir: &Utf8Path,
        mirrors: &MirrorSet,
        options: DownloadOptions,
    ) -> Result<Utf8PathBuf, TrustError>;
}

/// Opens a [`TrustEngine`] over an index's local metadata directory.
#[cfg_attr(test, mockall::automock)]
pub trait TrustEngineFactory {
    /// Open the engine for `index_url` whose metadata lives below
    /// `repository_dir` (`<data>/trust/<digest>`), fetching through
    /// `fetcher`.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::MissingLocalMetadata`] when the directory holds
    /// no metadata and [`TrustError::Repository`] when it is unusable.
    fn open(
        &self,
        index_url: &IndexUrl,
        repository_dir: &Utf8Path,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Box<dyn TrustEngine>, TrustError>;
}

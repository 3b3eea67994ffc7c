//! Error types for secure index downloads.
//!
//! Every failure surfaced to callers is a [`RepositoryError`]. The variants
//! fall into a small number of [`ErrorKind`]s that decide how a caller should
//! react: structural and configuration errors abort, connectivity errors may
//! be retried, and trust failures are never downgraded.

use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::index_url::IndexUrl;
use crate::trust::{TargetName, TrustError};

/// Coarse classification of a [`RepositoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input such as an unparseable project URL or a distribution
    /// link without a content-hash path. Never retried.
    Structural,
    /// Inconsistent trust bootstrap or a known-secure index without a
    /// repository. The installer must not continue insecurely.
    Configuration,
    /// Transport failure or mirror exhaustion. The caller may retry.
    Connectivity,
    /// Trust metadata or a target failed verification.
    Trust,
    /// Local filesystem failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Structural => "structural",
            Self::Configuration => "configuration",
            Self::Connectivity => "connectivity",
            Self::Trust => "trust",
            Self::Io => "I/O",
        };
        f.write_str(label)
    }
}

/// Errors that can occur while managing or downloading from secure indexes.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The project URL has no final path segment naming a project.
    #[error("failed to parse {url} as project index URL")]
    InvalidProjectUrl {
        /// The rejected URL.
        url: String,
    },

    /// The project name cannot be turned into an index target name.
    #[error("invalid project name \"{name}\": {reason}")]
    InvalidProjectName {
        /// The rejected project name.
        name: String,
        /// Description of the violated constraint.
        reason: String,
    },

    /// The distribution link does not carry the expected content-hash path.
    #[error("expected structure not found in link \"{link}\": {reason}")]
    InvalidDistributionLink {
        /// The rejected link.
        link: String,
        /// Description of the violated constraint.
        reason: String,
    },

    /// An index URL given to the manager is not a usable URL.
    #[error("invalid index URL {url}: {reason}")]
    InvalidIndexUrl {
        /// The rejected URL.
        url: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// A known-secure index has no local trust metadata.
    #[error("expected to find secure repository metadata for {index_url}")]
    MissingTrustMetadata {
        /// The canonical index URL.
        index_url: IndexUrl,
    },

    /// A known-secure index has no repository in the manager.
    #[error("expected to find secure downloader for {index_url}")]
    MissingSecureRepository {
        /// The canonical index URL.
        index_url: IndexUrl,
    },

    /// Local trust metadata exists but could not be loaded.
    #[error("failed to load secure repository configuration for {index_url}")]
    TrustConfiguration {
        /// The canonical index URL.
        index_url: IndexUrl,
        /// The trust engine's description of the problem.
        #[source]
        source: TrustError,
    },

    /// Copying shipped root metadata into the data directory failed.
    #[error("failed to bootstrap trust metadata at {path}")]
    Bootstrap {
        /// The path being created or copied.
        path: Utf8PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The manager configuration could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Every mirror failed while fetching metadata or a distribution.
    #[error("network connection failed for {index_url}")]
    Connectivity {
        /// The canonical index URL.
        index_url: IndexUrl,
        /// The transport failure reported by the trust engine.
        #[source]
        source: TrustError,
    },

    /// Trust metadata or a downloaded target failed verification.
    #[error("trust verification failed for {index_url}")]
    Trust {
        /// The canonical index URL.
        index_url: IndexUrl,
        /// The verification failure reported by the trust engine.
        #[source]
        source: TrustError,
    },

    /// A distribution link names a target the trust metadata does not know.
    #[error("distribution {target} is not listed in trust metadata for {index_url}")]
    UnknownDistribution {
        /// The canonical index URL.
        index_url: IndexUrl,
        /// The target name derived from the link.
        target: TargetName,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepositoryError {
    /// Classify this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use secure_index::{ErrorKind, RepositoryError};
    ///
    /// let err = RepositoryError::InvalidProjectUrl { url: "foo".to_owned() };
    /// assert_eq!(err.kind(), ErrorKind::Structural);
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidProjectUrl { .. }
            | Self::InvalidProjectName { .. }
            | Self::InvalidDistributionLink { .. } => ErrorKind::Structural,
            Self::InvalidIndexUrl { .. }
            | Self::MissingTrustMetadata { .. }
            | Self::MissingSecureRepository { .. }
            | Self::TrustConfiguration { .. }
            | Self::Bootstrap { .. }
            | Self::Config(_) => ErrorKind::Configuration,
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::Trust {
                source: TrustError::Io(_),
                ..
            }
            | Self::Io(_) => ErrorKind::Io,
            Self::Trust { .. } | Self::UnknownDistribution { .. } => ErrorKind::Trust,
        }
    }
}

/// Result type alias using [`RepositoryError`].
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn index_url() -> IndexUrl {
        IndexUrl::new("https://example.com/simple")
    }

    #[test]
    fn missing_secure_repository_names_the_index() {
        let err = RepositoryError::MissingSecureRepository {
            index_url: index_url(),
        };
        let msg = err.to_string();
        assert!(msg.contains("https://example.com/simple/"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn connectivity_preserves_source() {
        let err = RepositoryError::Connectivity {
            index_url: index_url(),
            source: TrustError::NoWorkingMirror {
                resource: "timestamp.json".to_owned(),
                errors: Vec::new(),
            },
        };
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert!(source.is_some_and(|s| s.contains("timestamp.json")));
    }

    #[rstest]
    #[case::rejected_metadata(
        TrustError::Repository { reason: "bad signature".to_owned() },
        ErrorKind::Trust
    )]
    #[case::local_io(TrustError::Io(std::io::Error::other("disk full")), ErrorKind::Io)]
    fn trust_kind_depends_on_source(#[case] source: TrustError, #[case] expected: ErrorKind) {
        let err = RepositoryError::Trust {
            index_url: index_url(),
            source,
        };
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn distribution_link_error_includes_link() {
        let err = RepositoryError::InvalidDistributionLink {
            link: "https://h/packages/x.tar.gz".to_owned(),
            reason: "too few path segments".to_owned(),
        };
        assert!(err.to_string().contains("https://h/packages/x.tar.gz"));
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Connectivity.to_string(), "connectivity");
        assert_eq!(ErrorKind::Io.to_string(), "I/O");
    }
}

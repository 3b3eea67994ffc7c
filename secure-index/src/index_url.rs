//! Canonical index URLs.
//!
//! Index URLs arrive from command lines and configuration files with or
//! without a trailing slash. [`IndexUrl`] always holds the canonical form so
//! that map lookups and metadata directory names agree regardless of how the
//! URL was spelled.

use std::fmt;

use sha2::{Digest, Sha224};
use url::Url;

use crate::error::{RepositoryError, Result};

/// A canonical index URL, always terminated with `/`.
///
/// # Examples
///
/// ```
/// use secure_index::index_url::IndexUrl;
///
/// let url = IndexUrl::new("https://pypi.org/simple");
/// assert_eq!(url.as_str(), "https://pypi.org/simple/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexUrl(String);

impl IndexUrl {
    /// Canonicalise `url` and wrap it.
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self(canonicalize_url(url))
    }

    /// Return the canonical URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the directory holding this index's trust metadata.
    ///
    /// The name is the hex-encoded SHA-224 digest of the canonical URL, which
    /// keeps it stable across runs and safe as a single path component.
    #[must_use]
    pub fn metadata_dir_name(&self) -> String {
        format!("{:x}", Sha224::digest(self.0.as_bytes()))
    }

    /// Split the URL into its origin and the targets path below it.
    ///
    /// `https://example.com/simple/` yields `("https://example.com",
    /// "simple/")`. The origin keeps a non-default port.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidIndexUrl`] if the URL does not parse
    /// or has no host.
    pub fn origin_and_path(&self) -> Result<(String, String)> {
        let parsed = Url::parse(&self.0).map_err(|e| RepositoryError::InvalidIndexUrl {
            url: self.0.clone(),
            reason: e.to_string(),
        })?;
        if !parsed.has_host() {
            return Err(RepositoryError::InvalidIndexUrl {
                url: self.0.clone(),
                reason: "URL has no host".to_owned(),
            });
        }
        let origin = parsed.origin().ascii_serialization();
        let targets_path = parsed.path().trim_start_matches('/').to_owned();
        Ok((origin, targets_path))
    }
}

impl AsRef<str> for IndexUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append a trailing `/` to `url` unless it already ends with one.
///
/// Canonicalisation is idempotent.
///
/// # Examples
///
/// ```
/// use secure_index::index_url::canonicalize_url;
///
/// let once = canonicalize_url("https://example.com/simple");
/// assert_eq!(once, "https://example.com/simple/");
/// assert_eq!(canonicalize_url(&once), once);
/// ```
#[must_use]
pub fn canonicalize_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_owned()
    } else {
        format!("{url}/")
    }
}

/// Split a project URL into its index URL and project name.
///
/// Trailing slashes on the project URL are ignored, so
/// `https://example.com/simple/foo/` yields the index
/// `https://example.com/simple/` and project `foo`.
///
/// # Errors
///
/// Returns [`RepositoryError::InvalidProjectUrl`] if the URL has no `/`
/// separated project segment or nothing in front of it.
pub fn split_project_url(project_url: &str) -> Result<(IndexUrl, String)> {
    let invalid = || RepositoryError::InvalidProjectUrl {
        url: project_url.to_owned(),
    };
    let trimmed = project_url.trim_end_matches('/');
    let (index, project) = trimmed.rsplit_once('/').ok_or_else(invalid)?;
    if index.is_empty() || project.is_empty() {
        return Err(invalid());
    }
    Ok((IndexUrl::new(index), project.to_owned()))
}

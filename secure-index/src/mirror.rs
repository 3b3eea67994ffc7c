//! Mirror configuration.
//!
//! A mirror is a URL prefix plus the paths below it that serve metadata and
//! targets. A repository keeps two [`MirrorSet`]s: one for index pages, where
//! the index host serves both, and one for distributions, where the index
//! host only serves metadata and the artefact hosts are registered as links
//! are followed.

use indexmap::IndexMap;

use crate::trust::TargetName;

/// Where one mirror serves metadata and targets.
///
/// A `None` path means the mirror does not serve that kind of file. An empty
/// path means files live directly below the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    url_prefix: String,
    metadata_path: Option<String>,
    targets_path: Option<String>,
}

impl MirrorConfig {
    /// A mirror at `url_prefix` serving nothing yet.
    #[must_use]
    pub fn new(url_prefix: impl Into<String>) -> Self {
        Self {
            url_prefix: url_prefix.into(),
            metadata_path: None,
            targets_path: None,
        }
    }

    /// Serve metadata from `path` below the prefix.
    #[must_use]
    pub fn with_metadata_path(mut self, path: impl Into<String>) -> Self {
        self.metadata_path = Some(path.into());
        self
    }

    /// Serve targets from `path` below the prefix.
    #[must_use]
    pub fn with_targets_path(mut self, path: impl Into<String>) -> Self {
        self.targets_path = Some(path.into());
        self
    }

    /// Return the URL prefix, which also keys the mirror in a [`MirrorSet`].
    #[must_use]
    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Return the metadata path, if this mirror serves metadata.
    #[must_use]
    pub fn metadata_path(&self) -> Option<&str> {
        self.metadata_path.as_deref()
    }

    /// Return the targets path, if this mirror serves targets.
    #[must_use]
    pub fn targets_path(&self) -> Option<&str> {
        self.targets_path.as_deref()
    }

    /// URL of metadata file `file_name` on this mirror.
    ///
    /// # Examples
    ///
    /// ```
    /// use secure_index::mirror::MirrorConfig;
    ///
    /// let mirror = MirrorConfig::new("https://example.com").with_metadata_path("tuf/");
    /// assert_eq!(
    ///     mirror.metadata_url("timestamp.json").as_deref(),
    ///     Some("https://example.com/tuf/timestamp.json"),
    /// );
    /// ```
    #[must_use]
    pub fn metadata_url(&self, file_name: &str) -> Option<String> {
        self.metadata_path
            .as_deref()
            .map(|path| join_url(&self.url_prefix, path, file_name))
    }

    /// URL of `target` on this mirror.
    #[must_use]
    pub fn target_url(&self, target: &TargetName) -> Option<String> {
        self.targets_path
            .as_deref()
            .map(|path| join_url(&self.url_prefix, path, target.as_str()))
    }
}

fn join_url(prefix: &str, path: &str, name: &str) -> String {
    let base = prefix.trim_end_matches('/');
    let directory = path.trim_matches('/');
    if directory.is_empty() {
        format!("{base}/{name}")
    } else {
        format!("{base}/{directory}/{name}")
    }
}

/// An append-only, insertion-ordered set of mirrors keyed by URL prefix.
///
/// Order matters: trust engines try mirrors front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorSet {
    mirrors: IndexMap<String, MirrorConfig>,
}

impl MirrorSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `mirror` unless a mirror with the same prefix is already present.
    ///
    /// Returns whether the mirror was added. An existing entry is never
    /// replaced.
    ///
    /// # Examples
    ///
    /// ```
    /// use secure_index::mirror::{MirrorConfig, MirrorSet};
    ///
    /// let mut set = MirrorSet::new();
    /// assert!(set.register(MirrorConfig::new("https://files.example/").with_targets_path("")));
    /// assert!(!set.register(MirrorConfig::new("https://files.example/")));
    /// assert_eq!(set.len(), 1);
    /// ```
    pub fn register(&mut self, mirror: MirrorConfig) -> bool {
        if self.mirrors.contains_key(mirror.url_prefix()) {
            return false;
        }
        self.mirrors.insert(mirror.url_prefix.clone(), mirror);
        true
    }

    /// Return the mirror registered under `url_prefix`.
    #[must_use]
    pub fn get(&self, url_prefix: &str) -> Option<&MirrorConfig> {
        self.mirrors.get(url_prefix)
    }

    /// Return whether a mirror is registered under `url_prefix`.
    #[must_use]
    pub fn contains(&self, url_prefix: &str) -> bool {
        self.mirrors.contains_key(url_prefix)
    }

    /// Number of registered mirrors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    /// Return whether no mirror is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    /// Mirrors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &MirrorConfig> {
        self.mirrors.values()
    }

    /// Mirrors that serve metadata, in registration order.
    pub fn metadata_mirrors(&self) -> impl Iterator<Item = &MirrorConfig> {
        self.iter().filter(|mirror| mirror.metadata_path.is_some())
    }

    /// Mirrors that serve targets, in registration order.
    pub fn target_mirrors(&self) -> impl Iterator<Item = &MirrorConfig> {
        self.iter().filter(|mirror| mirror.targets_path.is_some())
    }
}

impl FromIterator<MirrorConfig> for MirrorSet {
    fn from_iter<T: IntoIterator<Item = MirrorConfig>>(iter: T) -> Self {
        let mut set = Self::new();
        for mirror in iter {
            set.register(mirror);
        }
        set
    }
}

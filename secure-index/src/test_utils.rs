//! Shared test utilities for the secure-index crate.
//!
//! [`StaticFetcher`] serves canned responses keyed by URL and records each
//! request. [`FakeTrustEngine`] stands in for signed metadata with an
//! in-memory catalogue of expected SHA-256 digests, so tampered bodies are
//! still rejected while no real cryptography is involved.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};

use crate::bootstrap::current_root_path;
use crate::fetcher::{ChunkStream, FetchError, Fetcher, response_chunks};
use crate::index_url::IndexUrl;
use crate::mirror::MirrorSet;
use crate::progress::ProgressMode;
use crate::trust::{
    DownloadOptions, MirrorFailure, TargetDescriptor, TargetName, TrustEngine,
    TrustEngineFactory, TrustError,
};

/// Metadata file fetched by [`FakeTrustEngine::refresh`].
pub const TIMESTAMP_FILE: &str = "timestamp.json";

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Writes a minimal root metadata file for `index_url` below `trust_dir`
/// and returns the repository directory.
///
/// # Errors
///
/// Returns any I/O error raised while creating the layout.
pub fn seed_trust_metadata(
    trust_dir: &Utf8Path,
    index_url: &IndexUrl,
) -> std::io::Result<Utf8PathBuf> {
    let repository_dir = trust_dir.join(index_url.metadata_dir_name());
    let root = current_root_path(&repository_dir);
    if let Some(current) = root.parent() {
        std::fs::create_dir_all(current)?;
    }
    std::fs::create_dir_all(repository_dir.join("metadata").join("previous"))?;
    std::fs::write(&root, "{\"signed\":{\"_type\":\"root\"}}")?;
    Ok(repository_dir)
}

/// What a [`StaticFetcher`] answers for a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CannedResponse {
    /// A successful response with this body.
    Body(Vec<u8>),
    /// A non-success status code.
    Status(u16),
    /// The host cannot be reached.
    Unreachable,
}

/// One request observed by a [`StaticFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// The requested URL.
    pub url: String,
    /// The length the caller expected.
    pub required_length: u64,
    /// The progress mode the caller asked for.
    pub progress: ProgressMode,
}

/// A `Fetcher` serving canned responses.
///
/// URLs without a canned response answer with HTTP 404.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: HashMap<String, CannedResponse>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StaticFetcher {
    /// Creates a fetcher with no canned responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` for `url`.
    #[must_use]
    pub fn with_body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses
            .insert(url.to_owned(), CannedResponse::Body(body.into()));
        self
    }

    /// Answers `url` with `status`.
    #[must_use]
    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.responses
            .insert(url.to_owned(), CannedResponse::Status(status));
        self
    }

    /// Fails every request for `url` as if the host were down.
    #[must_use]
    pub fn with_unreachable(mut self, url: &str) -> Self {
        self.responses
            .insert(url.to_owned(), CannedResponse::Unreachable);
        self
    }

    /// Returns every request seen so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.log().clone()
    }

    /// Returns how often `url` was requested.
    #[must_use]
    pub fn request_count(&self, url: &str) -> usize {
        self.log()
            .iter()
            .filter(|request| request.url == url)
            .count()
    }

    fn log(&self) -> MutexGuard<'_, Vec<FetchRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(
        &self,
        url: &str,
        required_length: u64,
        progress: ProgressMode,
    ) -> Result<ChunkStream, FetchError> {
        self.log().push(FetchRequest {
            url: url.to_owned(),
            required_length,
            progress,
        });
        match self.responses.get(url) {
            Some(CannedResponse::Body(body)) => Ok(response_chunks(Cursor::new(body.clone()), url)),
            Some(CannedResponse::Status(status)) => Err(FetchError::Http {
                url: url.to_owned(),
                status: *status,
            }),
            Some(CannedResponse::Unreachable) => Err(FetchError::Transport {
                url: url.to_owned(),
                reason: "connection refused".to_owned(),
            }),
            None => Err(FetchError::Http {
                url: url.to_owned(),
                status: 404,
            }),
        }
    }
}

/// Call counters shared by every engine a [`FakeEngineFactory`] opens.
#[derive(Debug, Default)]
pub struct EngineStats {
    refreshes: AtomicUsize,
    downloads: AtomicUsize,
}

impl EngineStats {
    /// Number of [`TrustEngine::refresh`] calls.
    #[must_use]
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Number of [`TrustEngine::download_target`] calls.
    #[must_use]
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

type Catalogue = BTreeMap<TargetName, TargetDescriptor>;

/// A `TrustEngineFactory` opening [`FakeTrustEngine`]s.
///
/// Opening requires a readable, JSON-parseable `root.json` in the repository
/// directory, mirroring how a real engine loads its root of trust.
#[derive(Debug, Default)]
pub struct FakeEngineFactory {
    catalogues: HashMap<IndexUrl, Catalogue>,
    stats: Arc<EngineStats>,
}

impl FakeEngineFactory {
    /// Creates a factory whose engines know no targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists `target` with the digest and length of `bytes` in the metadata
    /// of `index_url`.
    ///
    /// # Panics
    ///
    /// Panics if `target` is not a valid target name.
    #[must_use]
    #[expect(clippy::expect_used, reason = "test helper taking literal names")]
    pub fn with_target(mut self, index_url: &str, target: &str, bytes: &[u8]) -> Self {
        let name = TargetName::new(target).expect("valid target name");
        let descriptor = TargetDescriptor::new(name.clone(), bytes.len() as u64)
            .with_hash("sha256", &sha256_hex(bytes));
        self.catalogues
            .entry(IndexUrl::new(index_url))
            .or_default()
            .insert(name, descriptor);
        self
    }

    /// Returns the counters shared by every opened engine.
    #[must_use]
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }
}

impl TrustEngineFactory for FakeEngineFactory {
    fn open(
        &self,
        index_url: &IndexUrl,
        repository_dir: &Utf8Path,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Box<dyn TrustEngine>, TrustError> {
        let root = current_root_path(repository_dir);
        if !root.is_file() {
            return Err(TrustError::MissingLocalMetadata {
                path: repository_dir.to_owned(),
            });
        }
        let contents = std::fs::read_to_string(&root)?;
        serde_json::from_str::<serde_json::Value>(&contents).map_err(|e| {
            TrustError::Repository {
                reason: format!("{root}: {e}"),
            }
        })?;
        Ok(Box::new(FakeTrustEngine {
            catalogue: self.catalogues.get(index_url).cloned().unwrap_or_default(),
            fetcher,
            stats: Arc::clone(&self.stats),
        }))
    }
}

/// A `TrustEngine` verifying targets against an in-memory catalogue.
pub struct FakeTrustEngine {
    catalogue: Catalogue,
    fetcher: Arc<dyn Fetcher>,
    stats: Arc<EngineStats>,
}

impl FakeTrustEngine {
    fn fetch_all(
        &self,
        url: &str,
        required_length: u64,
        progress: ProgressMode,
    ) -> Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        for chunk in self.fetcher.fetch(url, required_length, progress)? {
            body.extend(chunk?);
        }
        Ok(body)
    }
}

impl TrustEngine for FakeTrustEngine {
    fn refresh(&mut self, mirrors: &MirrorSet) -> Result<(), TrustError> {
        self.stats.refreshes.fetch_add(1, Ordering::SeqCst);
        let mut errors = Vec::new();
        for url in mirrors
            .metadata_mirrors()
            .filter_map(|mirror| mirror.metadata_url(TIMESTAMP_FILE))
        {
            match self.fetch_all(&url, 0, ProgressMode::Off) {
                Ok(_) => return Ok(()),
                Err(error) => errors.push(MirrorFailure { url, error }),
            }
        }
        Err(TrustError::NoWorkingMirror {
            resource: TIMESTAMP_FILE.to_owned(),
            errors,
        })
    }

    fn target_info(
        &mut self,
        name: &TargetName,
        _mirrors: &MirrorSet,
    ) -> Result<Option<TargetDescriptor>, TrustError> {
        Ok(self.catalogue.get(name).cloned())
    }

    fn cached_target(
        &self,
        target: &TargetDescriptor,
        dest_dir: &Utf8Path,
        options: DownloadOptions,
    ) -> Result<Option<Utf8PathBuf>, TrustError> {
        let path = target.local_path(dest_dir, options.prefix_filename_with_hash);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let matches = target.hash("sha256") == Some(sha256_hex(&bytes).as_str());
        Ok(matches.then_some(path))
    }

    fn download_target(
        &mut self,
        target: &TargetDescriptor,
        dest_dir: &Utf8Path,
        mirrors: &MirrorSet,
        options: DownloadOptions,
    ) -> Result<Utf8PathBuf, TrustError> {
        self.stats.downloads.fetch_add(1, Ordering::SeqCst);
        let mut errors = Vec::new();
        for url in mirrors
            .target_mirrors()
            .filter_map(|mirror| mirror.target_url(target.name()))
        {
            match self.fetch_all(&url, target.length(), options.progress) {
                Ok(body) => return store_verified(target, &body, dest_dir, options),
                Err(error) => errors.push(MirrorFailure { url, error }),
            }
        }
        Err(TrustError::NoWorkingMirror {
            resource: target.name().to_string(),
            errors,
        })
    }
}

fn store_verified(
    target: &TargetDescriptor,
    body: &[u8],
    dest_dir: &Utf8Path,
    options: DownloadOptions,
) -> Result<Utf8PathBuf, TrustError> {
    let reject = |reason: String| TrustError::TargetVerification {
        name: target.name().to_string(),
        reason,
    };
    if body.len() as u64 != target.length() {
        return Err(reject(format!(
            "expected {} bytes, received {}",
            target.length(),
            body.len()
        )));
    }
    let actual = sha256_hex(body);
    if target.hash("sha256") != Some(actual.as_str()) {
        return Err(reject(format!("sha256 mismatch, received {actual}")));
    }

    let path = target.local_path(dest_dir, options.prefix_filename_with_hash);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, body)?;
    Ok(path)
}

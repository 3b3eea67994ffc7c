//! Streaming fetcher consumed by the trust engine.
//!
//! The trust engine decides which URLs to request and in which mirror order;
//! a [`Fetcher`] only turns one URL into a sequence of byte chunks. Non-success
//! responses surface as [`FetchError::Http`] with the status code so that the
//! engine can apply its own mirror fallback.

use std::io::{ErrorKind, Read};
use std::sync::OnceLock;
use std::time::Duration;

use crate::progress::{self, ProgressMode};

/// Network timeout for a whole request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes requested from the response body per chunk.
const CHUNK_SIZE: usize = 10 * 1024;

const USER_AGENT: &str = concat!("secure-index/", env!("CARGO_PKG_VERSION"));

/// A lazily read response body.
pub type ChunkStream = Box<dyn Iterator<Item = Result<Vec<u8>, FetchError>>>;

/// Errors arising while fetching a URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// The response status code.
        status: u16,
    },

    /// The request or the body transfer failed.
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },
}

impl FetchError {
    /// Return the HTTP status code, if the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport { .. } => None,
        }
    }
}

/// Turns a URL into a stream of body chunks.
///
/// Implementations are stateless per call: the progress mode travels with
/// each request, so one fetcher can be shared by every repository.
#[cfg_attr(test, mockall::automock)]
pub trait Fetcher {
    /// Issue a GET for `url`.
    ///
    /// `required_length` is the length the trust metadata expects, used to
    /// size the progress bar when `progress` is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] for non-success responses and
    /// [`FetchError::Transport`] when the server cannot be reached.
    fn fetch(
        &self,
        url: &str,
        required_length: u64,
        progress: ProgressMode,
    ) -> Result<ChunkStream, FetchError>;
}

/// HTTP fetcher using `ureq`.
#[derive(Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: shared_agent().clone(),
        }
    }

    /// Create a fetcher whose requests time out after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        required_length: u64,
        progress: ProgressMode,
    ) -> Result<ChunkStream, FetchError> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let content_length = response.body().content_length();
        let chunks = response_chunks(response.into_body().into_reader(), url);

        if !progress.is_enabled() || !progress::should_show_progress(content_length) {
            return Ok(chunks);
        }
        let total = if required_length > 0 {
            required_length
        } else {
            content_length.unwrap_or_default()
        };
        Ok(progress::track(chunks, progress, total))
    }
}

/// Shared `ureq` agent with the default timeout.
fn shared_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| build_agent(DEFAULT_TIMEOUT))
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(status) => FetchError::Http {
            url: url.to_owned(),
            status: *status,
        },
        other => FetchError::Transport {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

/// Read `reader` lazily in fixed-size chunks.
///
/// A read failure part-way through the body is reported once as
/// [`FetchError::Transport`] and ends the stream.
#[must_use]
pub fn response_chunks<R>(reader: R, url: &str) -> ChunkStream
where
    R: Read + 'static,
{
    Box::new(ResponseChunks {
        reader,
        url: url.to_owned(),
        finished: false,
    })
}

struct ResponseChunks<R> {
    reader: R,
    url: String,
    finished: bool,
}

impl<R: Read> Iterator for ResponseChunks<R> {
    type Item = Result<Vec<u8>, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut buffer = vec![0; CHUNK_SIZE];
        loop {
            match self.reader.read(&mut buffer) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(read) => {
                    buffer.truncate(read);
                    return Some(Ok(buffer));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(FetchError::Transport {
                        url: self.url.clone(),
                        reason: e.to_string(),
                    }));
                }
            }
        }
    }
}

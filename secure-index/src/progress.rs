//! Progress reporting for downloaded artefact bodies.
//!
//! Metadata and index pages are always fetched silently; distribution bodies
//! may be wrapped in a progress bar when the caller asks for one and the
//! response is large enough to be worth it.

use std::fmt;
use std::str::FromStr;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

use crate::fetcher::ChunkStream;

/// Responses at or below this many bytes never show progress.
const MIN_PROGRESS_LENGTH: u64 = 40_000;

const BAR_TEMPLATE: &str = "{spinner:.cyan} [{bar:30.cyan/dim}] {bytes}/{total_bytes} ({eta})";
const ASCII_TEMPLATE: &str = "[{bar:30}] {bytes}/{total_bytes} ({eta})";

/// How progress is rendered for a download.
///
/// # Examples
///
/// ```
/// use secure_index::progress::ProgressMode;
///
/// let mode: ProgressMode = "ascii".parse().unwrap();
/// assert!(mode.is_enabled());
/// assert!(!ProgressMode::Off.is_enabled());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    /// No progress output.
    Off,
    /// A coloured Unicode progress bar.
    #[default]
    On,
    /// A plain ASCII progress bar for limited terminals.
    Ascii,
}

impl ProgressMode {
    /// Return whether this mode renders anything.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }
}

impl fmt::Display for ProgressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Off => "off",
            Self::On => "on",
            Self::Ascii => "ascii",
        };
        f.write_str(label)
    }
}

/// A string did not name a [`ProgressMode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown progress mode \"{value}\"; expected one of: off, on, ascii")]
pub struct ParseProgressModeError {
    /// The rejected value.
    pub value: String,
}

impl FromStr for ProgressMode {
    type Err = ParseProgressModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "on" => Ok(Self::On),
            "ascii" => Ok(Self::Ascii),
            _ => Err(ParseProgressModeError {
                value: value.to_owned(),
            }),
        }
    }
}

/// Return whether a response of `content_length` bytes warrants a progress
/// bar, given whether informational output is visible.
#[must_use]
pub fn progress_applies(content_length: Option<u64>, info_visible: bool) -> bool {
    info_visible && content_length.is_some_and(|length| length > MIN_PROGRESS_LENGTH)
}

/// [`progress_applies`] against the active logger's verbosity.
#[must_use]
pub fn should_show_progress(content_length: Option<u64>) -> bool {
    progress_applies(content_length, log::log_enabled!(log::Level::Info))
}

/// Wrap `chunks` so that each chunk advances a progress bar of `total`
/// bytes. Returns `chunks` unchanged for [`ProgressMode::Off`].
#[must_use]
pub fn track(chunks: ChunkStream, mode: ProgressMode, total: u64) -> ChunkStream {
    if !mode.is_enabled() {
        return chunks;
    }
    let bar = ProgressBar::new(total);
    bar.set_style(bar_style(mode));
    Box::new(ProgressChunks::new(chunks, bar))
}

fn bar_style(mode: ProgressMode) -> ProgressStyle {
    let (template, chars) = match mode {
        ProgressMode::Ascii => (ASCII_TEMPLATE, "=> "),
        ProgressMode::On | ProgressMode::Off => (BAR_TEMPLATE, "━╸━"),
    };
    ProgressStyle::default_bar()
        .template(template)
        .map_or_else(|_| ProgressStyle::default_bar(), |style| style.progress_chars(chars))
}

/// Chunk iterator that advances a progress bar as chunks pass through.
///
/// The bar is cleared when the stream ends and abandoned on the first error.
pub struct ProgressChunks<I> {
    inner: I,
    bar: ProgressBar,
}

impl<I> ProgressChunks<I> {
    /// Report progress for `inner` on `bar`.
    #[must_use]
    pub const fn new(inner: I, bar: ProgressBar) -> Self {
        Self { inner, bar }
    }
}

impl<I, E> Iterator for ProgressChunks<I>
where
    I: Iterator<Item = Result<Vec<u8>, E>>,
{
    type Item = Result<Vec<u8>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.inner.next();
        match &next {
            Some(Ok(chunk)) => self.bar.inc(u64::try_from(chunk.len()).unwrap_or(u64::MAX)),
            Some(Err(_)) => self.bar.abandon(),
            None => self.bar.finish_and_clear(),
        }
        next
    }
}

impl<I> Drop for ProgressChunks<I> {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("off", ProgressMode::Off)]
    #[case("ON", ProgressMode::On)]
    #[case(" ascii ", ProgressMode::Ascii)]
    fn parses_modes(#[case] input: &str, #[case] expected: ProgressMode) {
        assert_eq!(input.parse::<ProgressMode>(), Ok(expected));
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = "emoji".parse::<ProgressMode>().expect_err("unknown mode");
        assert!(err.to_string().contains("emoji"));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for mode in [ProgressMode::Off, ProgressMode::On, ProgressMode::Ascii] {
            assert_eq!(mode.to_string().parse::<ProgressMode>(), Ok(mode));
        }
    }

    #[rstest]
    #[case::unknown_length(None, true, false)]
    #[case::small_body(Some(1_000), true, false)]
    #[case::quiet_logger(Some(1_000_000), false, false)]
    #[case::large_body(Some(1_000_000), true, true)]
    fn progress_needs_length_and_verbosity(
        #[case] length: Option<u64>,
        #[case] info_visible: bool,
        #[case] expected: bool,
    ) {
        assert_eq!(progress_applies(length, info_visible), expected);
    }

    #[test]
    fn progress_chunks_advance_and_finish() {
        let bar = ProgressBar::hidden();
        let chunks: Vec<Result<Vec<u8>, ()>> = vec![Ok(vec![0; 10]), Ok(vec![0; 5])];
        let mut tracked = ProgressChunks::new(chunks.into_iter(), bar.clone());
        assert!(tracked.next().is_some());
        assert_eq!(bar.position(), 10);
        assert!(tracked.next().is_some());
        assert!(tracked.next().is_none());
        assert_eq!(bar.position(), 15);
        assert!(bar.is_finished());
    }

    #[test]
    fn progress_chunks_pass_errors_through() {
        let bar = ProgressBar::hidden();
        let chunks: Vec<Result<Vec<u8>, &str>> = vec![Ok(vec![1]), Err("reset")];
        let collected: Vec<_> = ProgressChunks::new(chunks.into_iter(), bar.clone()).collect();
        assert_eq!(collected, vec![Ok(vec![1]), Err("reset")]);
        assert!(bar.is_finished());
    }

    #[test]
    fn off_mode_leaves_stream_untouched() {
        let chunks: ChunkStream = Box::new(vec![Ok(b"abc".to_vec())].into_iter());
        let collected: Vec<_> = track(chunks, ProgressMode::Off, 3).collect();
        assert_eq!(collected.len(), 1);
    }
}

//! Distribution link decomposition.
//!
//! Distribution files are served from content-addressed paths: the three
//! directories in front of the file name concatenate to a 64-character hex
//! digest, e.g.
//!
//! ```text
//! https://files.example/packages/8f/1f/74aa…025cc/Django-1.1.3.tar.gz
//! ```
//!
//! The part in front of the hash path is the mirror base and the hash path
//! plus file name is the target name known to trust metadata. Any other shape
//! means the remote layout is not one this crate understands.

use url::Url;

use crate::error::{RepositoryError, Result};
use crate::trust::TargetName;

/// Number of path segments forming the target name (three hash directories
/// and the file name).
const TARGET_SEGMENTS: usize = 4;

/// Hex characters in the content hash spread over the hash directories.
const HASH_HEX_LEN: usize = 64;

/// A distribution link split into mirror base and target name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionTarget {
    mirror_base: String,
    target_name: TargetName,
}

impl DistributionTarget {
    /// URL prefix serving the target, always ending in `/`.
    #[must_use]
    pub fn mirror_base(&self) -> &str {
        &self.mirror_base
    }

    /// Target name in `h1/h2/h3/filename` form.
    #[must_use]
    pub const fn target_name(&self) -> &TargetName {
        &self.target_name
    }
}

/// Split `link` into its mirror base and hash-path target name.
///
/// Query strings and fragments such as `#sha256=…` are ignored.
///
/// # Examples
///
/// ```
/// use secure_index::distribution::split_distribution_url;
///
/// let hash = "74aa91b56dea5847b62e11ce6737db82c6446561bddc20ca80fa5df025cc";
/// let link = format!("https://files.example/packages/8f/1f/{hash}/Django-1.1.3.tar.gz");
/// let target = split_distribution_url(&link).unwrap();
/// assert_eq!(target.mirror_base(), "https://files.example/packages/");
/// assert_eq!(
///     target.target_name().as_str(),
///     format!("8f/1f/{hash}/Django-1.1.3.tar.gz"),
/// );
/// ```
///
/// # Errors
///
/// Returns [`RepositoryError::InvalidDistributionLink`] if the link does not
/// parse, has fewer than four path segments, or its three hash directories
/// do not concatenate to exactly 64 hex characters.
pub fn split_distribution_url(link: &str) -> Result<DistributionTarget> {
    let parsed = Url::parse(link).map_err(|e| invalid(link, e.to_string()))?;
    if !parsed.has_host() {
        return Err(invalid(link, "link has no host"));
    }

    let segments: Vec<&str> = parsed.path().split('/').collect();
    let split_at = segments
        .len()
        .checked_sub(TARGET_SEGMENTS)
        .filter(|&at| at > 0)
        .ok_or_else(|| invalid(link, "too few path segments"))?;
    let (base, tail) = segments.split_at(split_at);
    let [first, second, third, file_name] = tail else {
        return Err(invalid(link, "too few path segments"));
    };

    let hash = format!("{first}{second}{third}");
    if hash.len() != HASH_HEX_LEN {
        return Err(invalid(
            link,
            format!(
                "expected {HASH_HEX_LEN} hash characters, found {}",
                hash.len()
            ),
        ));
    }
    if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid(link, "hash path contains non-hex characters"));
    }
    if file_name.is_empty() {
        return Err(invalid(link, "link has no file name"));
    }

    let target_name = TargetName::new(tail.join("/")).map_err(|e| invalid(link, e.reason))?;
    let mirror_base = format!(
        "{}{}/",
        parsed.origin().ascii_serialization(),
        base.join("/")
    );
    Ok(DistributionTarget {
        mirror_base,
        target_name,
    })
}

fn invalid(link: &str, reason: impl Into<String>) -> RepositoryError {
    RepositoryError::InvalidDistributionLink {
        link: link.to_owned(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HASH_TAIL: &str = "74aa91b56dea5847b62e11ce6737db82c6446561bddc20ca80fa5df025cc";

    fn django_link() -> String {
        let base = "https://files.pythonhosted.org/packages";
        format!("{base}/8f/1f/{HASH_TAIL}/Django-1.1.3.tar.gz#sha256=abc")
    }

    #[test]
    fn splits_pypi_layout() {
        let target = split_distribution_url(&django_link()).expect("valid link");
        assert_eq!(target.mirror_base(), "https://files.pythonhosted.org/packages/");
        assert_eq!(
            target.target_name().as_str(),
            format!("8f/1f/{HASH_TAIL}/Django-1.1.3.tar.gz")
        );
    }

    #[test]
    fn hash_path_directly_below_host_uses_root_base() {
        let link = format!("http://localhost:8000/8f/1f/{HASH_TAIL}/pkg.whl");
        let target = split_distribution_url(&link).expect("valid link");
        assert_eq!(target.mirror_base(), "http://localhost:8000/");
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let link = format!(
            "https://h/packages/8F/1F/{}/pkg.whl",
            HASH_TAIL.to_ascii_uppercase()
        );
        assert!(split_distribution_url(&link).is_ok());
    }

    #[rstest]
    #[case::short_hash("https://h/packages/8f/1f/74aa/pkg.tar.gz")]
    #[case::long_hash(&format!("https://h/packages/8f/1f/{HASH_TAIL}0/pkg.tar.gz"))]
    #[case::non_hex(&format!("https://h/packages/8f/1g/{HASH_TAIL}/pkg.tar.gz"))]
    #[case::no_hash_path("https://h/packages/pkg.tar.gz")]
    #[case::too_few_segments(&format!("https://h/1f/{HASH_TAIL}/pkg.tar.gz"))]
    #[case::missing_file_name(&format!("https://h/packages/8f/1f/{HASH_TAIL}/"))]
    #[case::not_a_url("packages/8f/1f/pkg.tar.gz")]
    fn rejects_unexpected_layouts(#[case] link: &str) {
        let err = split_distribution_url(link).expect_err("layout should be rejected");
        assert!(
            matches!(err, RepositoryError::InvalidDistributionLink { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn hash_split_across_directories_is_counted_as_a_whole() {
        let link = format!(
            "https://h/p/{}/{}/{}/f.zip",
            "a".repeat(2),
            "b".repeat(2),
            "c".repeat(60)
        );
        let target = split_distribution_url(&link).expect("64 hex characters in total");
        assert_eq!(target.mirror_base(), "https://h/p/");
    }
}

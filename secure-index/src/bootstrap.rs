//! Seeding the data directory with shipped root metadata.
//!
//! Each shipped root lives at `<bootstrap_dir>/<name>/root.json`, where
//! `<name>` is the metadata directory name of the index it anchors. The
//! first run copies it to `<trust_dir>/<name>/metadata/current/root.json`
//! and creates the empty `previous/` directory next to it. Existing
//! repository directories are never touched, so roots rotated by the trust
//! engine survive later runs.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

use crate::error::{RepositoryError, Result};

/// File name of the root-of-trust metadata.
pub const ROOT_FILE: &str = "root.json";

/// Path of the active root metadata inside `repository_dir`.
#[must_use]
pub fn current_root_path(repository_dir: &Utf8Path) -> Utf8PathBuf {
    repository_dir.join("metadata").join("current").join(ROOT_FILE)
}

/// Copy every shipped root in `bootstrap_dir` into `trust_dir` unless the
/// corresponding repository directory already exists.
///
/// Returns the names that were bootstrapped, in sorted order. A repository
/// whose seeding fails part-way is removed again so that the next run can
/// retry it.
///
/// # Errors
///
/// Returns [`RepositoryError::Bootstrap`] if the bootstrap directory cannot
/// be listed or a repository directory cannot be created or populated.
pub fn bootstrap_metadata(bootstrap_dir: &Utf8Path, trust_dir: &Utf8Path) -> Result<Vec<String>> {
    let mut names = shipped_names(bootstrap_dir)?;
    names.sort();

    let mut bootstrapped = Vec::new();
    for name in names {
        let repository_dir = trust_dir.join(&name);
        if repository_dir.exists() {
            continue;
        }
        debug!("Bootstrapping trust metadata for {name}");
        seed_repository(&bootstrap_dir.join(&name).join(ROOT_FILE), &repository_dir)?;
        bootstrapped.push(name);
    }
    Ok(bootstrapped)
}

fn shipped_names(bootstrap_dir: &Utf8Path) -> Result<Vec<String>> {
    let entries = bootstrap_dir
        .read_dir_utf8()
        .map_err(|source| bootstrap_error(bootstrap_dir, source))?;
    let mut names = Vec::new();
    for listed in entries {
        let entry = listed.map_err(|source| bootstrap_error(bootstrap_dir, source))?;
        let is_dir = entry
            .file_type()
            .map_err(|source| bootstrap_error(entry.path(), source))?
            .is_dir();
        if is_dir {
            names.push(entry.file_name().to_owned());
        }
    }
    Ok(names)
}

fn seed_repository(root: &Utf8Path, repository_dir: &Utf8Path) -> Result<()> {
    let result = create_layout(root, repository_dir);
    if result.is_err() {
        if let Err(e) = std::fs::remove_dir_all(repository_dir) {
            debug!("Failed to clean up {repository_dir}: {e}");
        }
    }
    result
}

fn create_layout(root: &Utf8Path, repository_dir: &Utf8Path) -> Result<()> {
    let metadata = repository_dir.join("metadata");
    let current = metadata.join("current");
    let previous = metadata.join("previous");

    std::fs::create_dir_all(&current).map_err(|source| bootstrap_error(&current, source))?;
    std::fs::create_dir(&previous).map_err(|source| bootstrap_error(&previous, source))?;
    let destination = current.join(ROOT_FILE);
    std::fs::copy(root, &destination).map_err(|source| bootstrap_error(root, source))?;
    Ok(())
}

fn bootstrap_error(path: &Utf8Path, source: std::io::Error) -> RepositoryError {
    RepositoryError::Bootstrap {
        path: path.to_owned(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Dirs {
        _temp: TempDir,
        bootstrap: Utf8PathBuf,
        trust: Utf8PathBuf,
    }

    #[fixture]
    fn dirs() -> Dirs {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        let bootstrap = root.join("bootstrap");
        let trust = root.join("data").join("trust");
        std::fs::create_dir_all(&bootstrap).expect("bootstrap dir");
        std::fs::create_dir_all(&trust).expect("trust dir");
        Dirs {
            _temp: temp,
            bootstrap,
            trust,
        }
    }

    fn ship_root(dirs: &Dirs, name: &str, contents: &str) {
        let dir = dirs.bootstrap.join(name);
        std::fs::create_dir_all(&dir).expect("shipped dir");
        std::fs::write(dir.join(ROOT_FILE), contents).expect("shipped root");
    }

    #[rstest]
    fn copies_root_into_expected_layout(dirs: Dirs) {
        ship_root(&dirs, "abc123", "{\"signed\":{}}");

        let done = bootstrap_metadata(&dirs.bootstrap, &dirs.trust).expect("bootstrap");

        assert_eq!(done, ["abc123"]);
        let root = current_root_path(&dirs.trust.join("abc123"));
        assert_eq!(
            std::fs::read_to_string(&root).expect("root copied"),
            "{\"signed\":{}}"
        );
        assert!(dirs.trust.join("abc123/metadata/previous").is_dir());
    }

    #[rstest]
    fn never_overwrites_existing_metadata(dirs: Dirs) {
        ship_root(&dirs, "abc123", "shipped");
        let existing = current_root_path(&dirs.trust.join("abc123"));
        std::fs::create_dir_all(existing.parent().expect("parent")).expect("existing dir");
        std::fs::write(&existing, "rotated").expect("existing root");

        let done = bootstrap_metadata(&dirs.bootstrap, &dirs.trust).expect("bootstrap");

        assert!(done.is_empty());
        assert_eq!(std::fs::read_to_string(&existing).expect("root"), "rotated");
    }

    #[rstest]
    fn second_run_is_a_no_op(dirs: Dirs) {
        ship_root(&dirs, "b", "root-b");
        ship_root(&dirs, "a", "root-a");

        let first = bootstrap_metadata(&dirs.bootstrap, &dirs.trust).expect("first run");
        let second = bootstrap_metadata(&dirs.bootstrap, &dirs.trust).expect("second run");

        assert_eq!(first, ["a", "b"]);
        assert!(second.is_empty());
    }

    #[rstest]
    fn ignores_loose_files(dirs: Dirs) {
        std::fs::write(dirs.bootstrap.join("README"), "notes").expect("loose file");
        let done = bootstrap_metadata(&dirs.bootstrap, &dirs.trust).expect("bootstrap");
        assert!(done.is_empty());
    }

    #[rstest]
    fn missing_root_file_cleans_up(dirs: Dirs) {
        std::fs::create_dir_all(dirs.bootstrap.join("broken")).expect("shipped dir");

        let err = bootstrap_metadata(&dirs.bootstrap, &dirs.trust).expect_err("no root.json");

        assert!(matches!(err, RepositoryError::Bootstrap { .. }));
        assert!(!dirs.trust.join("broken").exists());
    }

    #[rstest]
    fn missing_bootstrap_dir_is_an_error(dirs: Dirs) {
        let err = bootstrap_metadata(&dirs.bootstrap.join("absent"), &dirs.trust)
            .expect_err("absent bootstrap dir");
        assert!(matches!(err, RepositoryError::Bootstrap { .. }));
    }
}

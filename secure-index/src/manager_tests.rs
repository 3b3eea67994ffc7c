//! Unit tests for the repository manager.

use super::*;
use crate::bootstrap::current_root_path;
use crate::fetcher::MockFetcher;
use crate::trust::{MockTrustEngine, MockTrustEngineFactory, TrustEngine};
use rstest::{fixture, rstest};

struct Setup {
    _temp: TempDir,
    config: ManagerConfig,
    data_dir: Utf8PathBuf,
}

#[fixture]
fn setup() -> Setup {
    let temp = tempfile::tempdir().expect("temp dir");
    let data_dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
    Setup {
        _temp: temp,
        config: ManagerConfig::default().with_data_dir(data_dir.clone()),
        data_dir,
    }
}

fn fetcher() -> Arc<dyn Fetcher> {
    Arc::new(MockFetcher::new())
}

fn opening_factory() -> MockTrustEngineFactory {
    let mut factory = MockTrustEngineFactory::new();
    factory.expect_open().returning(|_, _, _| {
        let engine: Box<dyn TrustEngine> = Box::new(MockTrustEngine::new());
        Ok(engine)
    });
    factory
}

fn missing_factory() -> MockTrustEngineFactory {
    let mut factory = MockTrustEngineFactory::new();
    factory
        .expect_open()
        .returning(|_, dir, _| Err(TrustError::MissingLocalMetadata { path: dir.to_owned() }));
    factory
}

#[rstest]
fn spellings_of_one_index_share_a_repository(setup: Setup) {
    let mut factory = MockTrustEngineFactory::new();
    factory.expect_open().times(1).returning(|_, _, _| {
        let engine: Box<dyn TrustEngine> = Box::new(MockTrustEngine::new());
        Ok(engine)
    });

    let manager = RepositoryManager::new(
        &setup.config,
        &["https://example.com/simple", "https://example.com/simple/"],
        fetcher(),
        &factory,
    )
    .expect("manager");

    assert_eq!(manager.len(), 1);
    let urls: Vec<&str> = manager.index_urls().map(IndexUrl::as_str).collect();
    assert_eq!(urls, ["https://example.com/simple/"]);
    assert!(manager.get("https://example.com/simple").is_some());
}

#[rstest]
fn engines_open_in_hashed_repository_dirs(setup: Setup) {
    let expected = setup
        .data_dir
        .join("trust")
        .join(IndexUrl::new("https://example.com/simple/").metadata_dir_name());
    let mut factory = MockTrustEngineFactory::new();
    factory
        .expect_open()
        .withf(move |url, dir, _| {
            url.as_str() == "https://example.com/simple/" && dir == expected.as_path()
        })
        .times(1)
        .returning(|_, _, _| {
            let engine: Box<dyn TrustEngine> = Box::new(MockTrustEngine::new());
            Ok(engine)
        });

    let manager =
        RepositoryManager::new(&setup.config, &["https://example.com/simple"], fetcher(), &factory)
            .expect("manager");

    assert_eq!(manager.trust_dir(), setup.data_dir.join("trust").as_path());
    assert!(manager.trust_dir().is_dir());
}

#[rstest]
fn indexes_without_metadata_are_skipped(setup: Setup) {
    let mut manager = RepositoryManager::new(
        &setup.config,
        &["https://example.com/simple/"],
        fetcher(),
        &missing_factory(),
    )
    .expect("manager");

    assert!(manager.is_empty());
    let (repository, project) = manager
        .repository("https://example.com/simple/foo/")
        .expect("lookup");
    assert!(repository.is_none());
    assert_eq!(project, "foo");
}

#[rstest]
fn known_secure_index_requires_metadata(setup: Setup) {
    let err = RepositoryManager::new(
        &setup.config,
        &["http://localhost:8000/simple"],
        fetcher(),
        &missing_factory(),
    )
    .expect_err("known-secure index without metadata");

    match err {
        RepositoryError::MissingTrustMetadata { index_url } => {
            assert_eq!(index_url.as_str(), "http://localhost:8000/simple/");
        }
        other => panic!("expected MissingTrustMetadata, got {other:?}"),
    }
}

#[rstest]
fn known_secure_index_with_metadata_is_served_securely(setup: Setup) {
    let mut manager = RepositoryManager::new(
        &setup.config,
        &["http://localhost:8000/simple"],
        fetcher(),
        &opening_factory(),
    )
    .expect("manager");

    let (found, project) = manager
        .repository("http://localhost:8000/simple/foo")
        .expect("lookup");

    let repository = found.expect("secured index");
    assert_eq!(repository.index_url().as_str(), "http://localhost:8000/simple/");
    assert_eq!(project, "foo");
}

#[rstest]
fn unusable_metadata_is_a_configuration_error(setup: Setup) {
    let mut factory = MockTrustEngineFactory::new();
    factory.expect_open().returning(|_, _, _| {
        Err(TrustError::Repository {
            reason: "root.json is not valid JSON".to_owned(),
        })
    });

    let err = RepositoryManager::new(
        &setup.config,
        &["https://example.com/simple/"],
        fetcher(),
        &factory,
    )
    .expect_err("corrupt metadata");

    assert!(matches!(err, RepositoryError::TrustConfiguration { .. }));
    assert_eq!(err.kind(), crate::ErrorKind::Configuration);
}

#[rstest]
fn repository_routes_project_urls(setup: Setup) {
    let mut manager = RepositoryManager::new(
        &setup.config,
        &["https://example.com/simple/"],
        fetcher(),
        &opening_factory(),
    )
    .expect("manager");

    let (found, project) = manager
        .repository("https://example.com/simple/foo")
        .expect("lookup");

    let repository = found.expect("secured index");
    assert_eq!(repository.index_url().as_str(), "https://example.com/simple/");
    assert_eq!(project, "foo");
}

#[rstest]
fn known_secure_index_without_repository_is_rejected(setup: Setup) {
    let mut manager = RepositoryManager::new(
        &setup.config,
        &["https://example.com/simple/"],
        fetcher(),
        &opening_factory(),
    )
    .expect("manager");

    let err = manager
        .repository("http://localhost:8000/simple/foo")
        .expect_err("known-secure index is not configured");

    assert!(matches!(err, RepositoryError::MissingSecureRepository { .. }));
}

#[rstest]
#[case::no_separator("foo")]
#[case::only_slashes("///")]
fn unparseable_project_urls_are_rejected(setup: Setup, #[case] project_url: &str) {
    let mut manager =
        RepositoryManager::new(&setup.config, &[] as &[&str], fetcher(), &opening_factory())
            .expect("manager");

    let err = manager.repository(project_url).expect_err("invalid URL");

    assert!(matches!(err, RepositoryError::InvalidProjectUrl { .. }));
}

#[test]
fn missing_data_dir_uses_scratch_directory() {
    let manager = RepositoryManager::new(
        &ManagerConfig::default(),
        &["https://example.com/simple/"],
        fetcher(),
        &opening_factory(),
    )
    .expect("manager");

    assert!(manager.trust_dir().is_dir());
    assert!(manager.trust_dir().ends_with("trust"));
}

#[rstest]
fn shipped_roots_are_bootstrapped(setup: Setup) {
    let index_url = IndexUrl::new("https://example.com/simple/");
    let name = index_url.metadata_dir_name();
    let bootstrap_dir = setup.data_dir.join("shipped");
    std::fs::create_dir_all(bootstrap_dir.join(&name)).expect("shipped dir");
    std::fs::write(bootstrap_dir.join(&name).join("root.json"), "{}").expect("shipped root");
    let config = setup.config.clone().with_bootstrap_dir(bootstrap_dir);

    let manager =
        RepositoryManager::new(&config, &[index_url.as_str()], fetcher(), &opening_factory())
            .expect("manager");

    assert!(current_root_path(&manager.trust_dir().join(&name)).is_file());
}

#[rstest]
fn invalid_configuration_is_rejected(setup: Setup) {
    let mut config = setup.config.clone();
    config.timeout_secs = 0;

    let err = RepositoryManager::new(
        &config,
        &["https://example.com/simple/"],
        fetcher(),
        &opening_factory(),
    )
    .expect_err("invalid config");

    assert!(matches!(err, RepositoryError::Config(_)));
}

#[rstest]
#[case("http://localhost:8000/simple", true)]
#[case("http://localhost:8000/simple/", true)]
#[case("https://pypi.org/simple/", false)]
fn known_secure_matches_canonical_form(#[case] url: &str, #[case] expected: bool) {
    assert_eq!(is_known_secure(&IndexUrl::new(url)), expected);
}

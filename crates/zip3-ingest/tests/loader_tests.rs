//! Input loading tests: the ZCTA precondition and the state download cache

mod common;

use common::{state_archive_bytes, zctas, Fixture, STATE_BASE};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip3_ingest::config::InputConfig;
use zip3_ingest::loader::{InputLoader, StateBoundaryFetcher};
use zip3_ingest::{Crs, Pipeline, Zip3Error};

const ARCHIVE_PATH: &str = "/geo/tiger/GENZ2018/shp/states.zip";

fn download_config(server: &MockServer, cache_dir: &std::path::Path) -> InputConfig {
    InputConfig {
        state_cache_dir: cache_dir.to_path_buf(),
        state_base_name: STATE_BASE.to_string(),
        state_url: format!("{}{}", server.uri(), ARCHIVE_PATH),
        http_timeout_secs: 5,
        ..InputConfig::default()
    }
}

#[tokio::test]
async fn test_download_extracts_and_is_idempotent() {
    let scratch = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(state_archive_bytes(scratch.path())))
        .expect(1)
        .mount(&server)
        .await;

    let config = download_config(&server, cache.path());
    let fetcher = StateBoundaryFetcher::new(&config).unwrap();

    let first = fetcher.ensure_present().await.unwrap();
    assert_eq!(first, cache.path().join(format!("{STATE_BASE}.shp")));
    for ext in ["shx", "dbf", "prj"] {
        assert!(first.with_extension(ext).exists());
    }
    // archive is removed after extraction
    assert!(!cache.path().join("states.zip").exists());

    // second call must not hit the server (expect(1) is checked on drop)
    let second = fetcher.ensure_present().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_download_http_error_is_download_error() {
    let cache = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = download_config(&server, cache.path());
    let err = StateBoundaryFetcher::new(&config)
        .unwrap()
        .ensure_present()
        .await
        .unwrap_err();

    assert!(matches!(err, Zip3Error::Download { .. }));
    assert!(err.is_fatal());
    assert!(!cache.path().join(format!("{STATE_BASE}.shp")).exists());
}

#[tokio::test]
async fn test_download_checksum_mismatch() {
    let scratch = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(state_archive_bytes(scratch.path())))
        .mount(&server)
        .await;

    let config = InputConfig {
        state_archive_sha256: Some("0".repeat(64)),
        ..download_config(&server, cache.path())
    };
    let err = StateBoundaryFetcher::new(&config)
        .unwrap()
        .ensure_present()
        .await
        .unwrap_err();

    assert!(matches!(err, Zip3Error::ChecksumMismatch { .. }));
    assert!(!cache.path().join("states.zip").exists());
}

#[tokio::test]
async fn test_pipeline_downloads_missing_states() {
    let fixture = Fixture::new();
    let scratch = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(state_archive_bytes(scratch.path())))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = fixture.with_output("downloaded");
    config.input.state_cache_dir = fixture.dir.path().join("fresh-cache");
    config.input.state_url = format!("{}{}", server.uri(), ARCHIVE_PATH);

    let output = Pipeline::new(config).run().await.unwrap();
    assert_eq!(output.stats.load.states_loaded, 3);
    assert!(!output.regions.is_empty());
}

#[tokio::test]
async fn test_missing_zcta_files_fail_before_download() {
    let fixture = Fixture::new();
    let server = MockServer::start().await;

    // any request would be a failure of the precondition
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = fixture.with_output("never");
    config.input.zcta_dir = fixture.dir.path().join("no-such-dir");
    config.input.state_cache_dir = fixture.dir.path().join("empty-cache");
    config.input.state_url = format!("{}{}", server.uri(), ARCHIVE_PATH);

    let err = Pipeline::new(config.clone()).run().await.unwrap_err();
    assert!(matches!(err, Zip3Error::MissingInput { .. }));
    assert!(err.to_string().contains(".shp"));
    assert!(!config.output.dir.exists());
}

#[test]
fn test_load_local_reads_both_layers() {
    let fixture = Fixture::new();
    let loader = InputLoader::new(&fixture.config.input);
    let inputs = loader.load_local(&fixture.config.input.state_shapefile()).unwrap();

    assert_eq!(inputs.crs, Crs::Nad83);
    assert_eq!(inputs.zctas.len(), zctas().len());
    assert_eq!(inputs.states.len(), 3);
    assert_eq!(inputs.stats.zctas_malformed, 0);
    assert!(inputs.states.iter().any(|s| s.state_abbr == "VT" && s.state_fips == "50"));
}

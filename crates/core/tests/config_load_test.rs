// Config loading tests
//
// Exercises ConfigLoader against real files on disk.

use lobby_core::config::{ConfigLoader, StoreBackend};
use lobby_core::{Config, ConfigValidator, DomainError, InfraError, LobbyError};
use tempfile::TempDir;

#[test]
fn test_load_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lobby.yaml");
    std::fs::write(
        &path,
        "store:\n  backend: redis\n  op_timeout_ms: 750\ngateway:\n  port: 9000\n",
    )
    .unwrap();

    let config = ConfigLoader::load_file(&path).unwrap();
    assert_eq!(config.store.backend, StoreBackend::Redis);
    assert_eq!(config.store.op_timeout_ms, 750);
    assert_eq!(config.gateway.port, 9000);
    assert!(config.notifier.enabled);
}

#[test]
fn test_missing_explicit_file_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.yaml");

    let err = ConfigLoader::load(Some(path.to_str().unwrap())).unwrap_err();
    assert!(matches!(
        err,
        LobbyError::Domain(DomainError::ConfigNotFound { .. })
    ));
}

#[test]
fn test_malformed_file_is_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.yaml");
    std::fs::write(&path, "store: [not, a, map").unwrap();

    let err = ConfigLoader::load_file(&path).unwrap_err();
    assert!(matches!(
        err,
        LobbyError::Domain(DomainError::ConfigParse { .. })
    ));
}

#[test]
fn test_sample_save_and_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sample.yaml");

    Config::sample().save(&path).unwrap();
    let reloaded = ConfigLoader::load_file(&path).unwrap();

    assert_eq!(reloaded.store.backend, StoreBackend::Redis);
    assert_eq!(reloaded.worker.tenants, vec!["epic-games-123".to_string()]);
    assert!(ConfigValidator::validate(&reloaded).is_ok());
}

#[test]
fn test_unreadable_config_is_io_error() {
    let temp_dir = TempDir::new().unwrap();

    // the path exists but is a directory
    let err = ConfigLoader::load_file(temp_dir.path()).unwrap_err();
    assert!(matches!(err, LobbyError::Infra(InfraError::Io(_))));
}

#[test]
fn test_save_into_missing_directory_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing").join("lobby.yaml");

    let err = Config::sample().save(&path).unwrap_err();
    assert!(matches!(err, LobbyError::Infra(InfraError::Io(_))));
}

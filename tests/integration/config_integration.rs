//! Integration tests for layered configuration loading

use super::test_utils::with_xdg_env;
use factory_sync::config::{BackendKind, ConfigLoader};
use factory_sync::session::connect;
use factory_sync::SyncError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_defaults_without_any_files() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("ws");
    fs::create_dir_all(&workspace).unwrap();

    let config = with_xdg_env(&temp_dir, || ConfigLoader::load(&workspace).unwrap());
    assert_eq!(config.cache.stale_time_ms, 1000);
    assert!(config.cache.retry_transient);
    assert_eq!(config.backend.kind, BackendKind::Memory);
    assert_eq!(config.polling.status_running_ms, 2000);
    assert_eq!(config.polling.idle_ms, 10_000);
    assert_eq!(config.logging.level, "info");
    assert!(config.validate().is_ok());
}

#[test]
fn test_workspace_overrides_global_and_env_overrides_both() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("ws");
    fs::create_dir_all(workspace.join("config")).unwrap();

    let global_dir = temp_dir.path().join("config").join("factory-sync");
    fs::create_dir_all(&global_dir).unwrap();
    fs::write(
        global_dir.join("config.toml"),
        r#"
[polling]
idle_ms = 20000
projects_ms = 30000
"#,
    )
    .unwrap();
    fs::write(
        workspace.join("config").join("config.toml"),
        r#"
[polling]
idle_ms = 15000

[backend]
kind = "http"
endpoint = "http://127.0.0.1:7420"
"#,
    )
    .unwrap();
    fs::write(
        workspace.join("config").join("development.toml"),
        r#"
[polling]
logs_running_ms = 900
"#,
    )
    .unwrap();

    let config = with_xdg_env(&temp_dir, || {
        std::env::set_var("FACTORY_SYNC__CACHE__STALE_TIME_MS", "250");
        let config = ConfigLoader::load(&workspace);
        std::env::remove_var("FACTORY_SYNC__CACHE__STALE_TIME_MS");
        config.unwrap()
    });

    assert_eq!(config.polling.projects_ms, 30_000);
    assert_eq!(config.polling.idle_ms, 15_000);
    assert_eq!(config.polling.logs_running_ms, 900);
    assert_eq!(config.cache.stale_time_ms, 250);
    assert_eq!(config.backend.kind, BackendKind::Http);
    assert_eq!(
        config.backend.endpoint.as_deref(),
        Some("http://127.0.0.1:7420")
    );
}

#[test]
fn test_http_backend_without_endpoint_fails_validation() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("ws");
    fs::create_dir_all(workspace.join("config")).unwrap();
    fs::write(
        workspace.join("config").join("config.toml"),
        r#"
[backend]
kind = "http"

[cache]
stale_time_ms = 0
"#,
    )
    .unwrap();

    let result = with_xdg_env(&temp_dir, || ConfigLoader::load_validated(&workspace));
    match result {
        Err(SyncError::ConfigError(message)) => {
            assert!(message.contains("endpoint"), "{}", message);
            assert!(message.contains("stale_time_ms"), "{}", message);
        }
        other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_connect_builds_configured_backend() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sync.toml");
    fs::write(
        &path,
        r#"
[backend]
kind = "http"
endpoint = "http://127.0.0.1:7420/"
request_timeout_ms = 2000
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    assert!(connect(&config.backend).is_ok());

    let mut missing = config.backend.clone();
    missing.endpoint = None;
    assert!(matches!(connect(&missing), Err(SyncError::ConfigError(_))));
}

use super::*;
use crate::gateway_paths::set_home_for_test;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let config = GatewayConfig::default();
    assert_eq!(config.server.bind, "127.0.0.1:5000");
    assert_eq!(config.server.max_message_bytes, None);
    assert_eq!(config.cache.ttl(), Duration::from_secs(300));
    assert_eq!(config.cache.fetch_timeout(), Duration::from_secs(15));
    assert_eq!(config.licenses.max_age(), Duration::from_secs(600));
    assert_eq!(config.backend.auth_timeout(), Duration::from_secs(30));
    assert_eq!(config.logging.level, LogLevel::Info);
    assert!(!config.logging.file);
}

#[test]
fn test_partial_yaml_keeps_defaults() {
    let yaml = r#"
server:
  bind: "0.0.0.0:57348"
cache:
  ttl_secs: 60
"#;
    let config = GatewayConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.server.bind, "0.0.0.0:57348");
    assert_eq!(config.cache.ttl_secs, 60);
    assert_eq!(config.cache.fetch_timeout_secs, 15);
    assert_eq!(config.licenses.max_age_secs, 600);
}

#[test]
fn test_empty_yaml_is_default() {
    let config = GatewayConfig::from_yaml_str("  \n").unwrap();
    assert_eq!(config.server.bind, default_bind());
}

#[test]
fn test_unknown_keys_rejected() {
    let yaml = r#"
cache:
  ttl: 60
"#;
    assert!(GatewayConfig::from_yaml_str(yaml).is_err());
}

#[test]
fn test_full_yaml() {
    let yaml = r#"
server:
  bind: "127.0.0.1:6000"
  max_message_bytes: 1048576
licenses:
  max_age_secs: 30
  wait_timeout_secs: 2
credentials:
  location: /tmp/creds
backend:
  fixture: /tmp/fixture.yaml
  auth_timeout_secs: 5
logging:
  level: debug
  file: true
"#;
    let config = GatewayConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.server.max_message_bytes, Some(1_048_576));
    assert_eq!(config.licenses.wait_timeout(), Duration::from_secs(2));
    assert_eq!(
        config.credentials.location,
        Some(PathBuf::from("/tmp/creds"))
    );
    assert_eq!(
        config.backend.fixture,
        Some(PathBuf::from("/tmp/fixture.yaml"))
    );
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert!(config.logging.file);
}

#[test]
#[serial]
fn test_load_reads_home_config_and_env_overrides() {
    let temp_dir = TempDir::new().unwrap();
    let _guard = set_home_for_test(temp_dir.path().to_path_buf());
    std::fs::write(
        temp_dir.path().join("config.yaml"),
        "server:\n  bind: \"127.0.0.1:7000\"\n",
    )
    .unwrap();

    let config = GatewayConfig::load(None).unwrap();
    assert_eq!(config.server.bind, "127.0.0.1:7000");

    std::env::set_var(BIND_ENV, "127.0.0.1:7001");
    std::env::set_var(FIXTURE_ENV, "/tmp/other.yaml");
    let config = GatewayConfig::load(None).unwrap();
    std::env::remove_var(BIND_ENV);
    std::env::remove_var(FIXTURE_ENV);

    assert_eq!(config.server.bind, "127.0.0.1:7001");
    assert_eq!(
        config.backend.fixture,
        Some(PathBuf::from("/tmp/other.yaml"))
    );
}

#[test]
#[serial]
fn test_load_missing_explicit_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.yaml");
    assert!(GatewayConfig::load(Some(&missing)).is_err());
}

#[test]
#[serial]
fn test_default_credential_location_under_home() {
    let temp_dir = TempDir::new().unwrap();
    let _guard = set_home_for_test(temp_dir.path().to_path_buf());
    let location = CredentialConfig::default().resolve_location().unwrap();
    assert_eq!(location, temp_dir.path().join("client"));
}

//! Integration test: Configuration utilities
//!
//! Tests the bin_common path resolution together with YAML loading
//! of the server and client configs.

use routesockets_demo::bin_common::{load_config_from_env, ConfigType};
use routesockets_demo::routesockets::{ClientConfig, ConfigError, ServerConfig};
use std::env;
use std::io::Write;

#[test]
fn test_server_config_default_path() {
    env::remove_var("SERVER_CONFIG_PATH");

    let config_path = load_config_from_env(ConfigType::Server);
    assert_eq!(config_path.to_str().unwrap(), "config/server.yaml");
}

#[test]
fn test_client_config_path_from_env() {
    env::set_var("CLIENT_CONFIG_PATH", "/tmp/elsewhere/client.yaml");

    let config_path = load_config_from_env(ConfigType::Client);
    assert_eq!(config_path.to_str().unwrap(), "/tmp/elsewhere/client.yaml");

    env::remove_var("CLIENT_CONFIG_PATH");
}

#[test]
fn test_load_server_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port: 9443").unwrap();
    writeln!(file, "threads: 2").unwrap();
    writeln!(file, "timeout_idle_secs: 60").unwrap();
    writeln!(file, "tls:").unwrap();
    writeln!(file, "  certificate: server.crt").unwrap();
    writeln!(file, "  private_key: server.key").unwrap();

    let config = ServerConfig::load(file.path()).unwrap();
    assert_eq!(config.port, 9443);
    assert_eq!(config.threads, 2);
    assert_eq!(config.session.timeout_idle_secs, 60);
    assert!(config.is_secure());
}

#[test]
fn test_load_client_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "uri: localhost:8080/echo").unwrap();
    writeln!(file, "verify_certificate: false").unwrap();

    let config = ClientConfig::load(file.path()).unwrap();
    assert_eq!(config.url(), "ws://localhost:8080/echo");
    assert!(!config.verify_certificate);
}

#[test]
fn test_missing_file_is_file_error() {
    let error = ServerConfig::load("/nonexistent/server.yaml").unwrap_err();
    assert!(matches!(error, ConfigError::FileError(_)));
}

#[test]
fn test_malformed_yaml_is_yaml_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port: [not, a, number]").unwrap();

    let error = ServerConfig::load(file.path()).unwrap_err();
    assert!(matches!(error, ConfigError::YamlError(_)));
}

#[test]
fn test_shipped_configs_parse() {
    let manifest = env!("CARGO_MANIFEST_DIR");
    ServerConfig::load(format!("{}/config/server.yaml", manifest)).unwrap();
    ClientConfig::load(format!("{}/config/client.yaml", manifest)).unwrap();
}

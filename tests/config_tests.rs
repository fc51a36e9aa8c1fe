//! Configuration loading and validation tests

use std::io::Write;
use std::time::Duration;

use edge_gateway::config::Config;
use pretty_assertions::assert_eq;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn full_config_loads_from_file() {
    let file = write_config(
        r#"
server:
  host: "0.0.0.0"
  port: 8080
auth:
  enabled: true
  issuer: https://keycloak.example.com/realms/demo
  audiences: ["gateway"]
circuit_breaker:
  failure_threshold: 3
  window: 10s
  cooldown: 5s
fallback:
  status: 503
routes:
  - id: crypto
    path: /crypto/**
    target: http://crypto:8077
    timeout: 3s
  - id: metrics-scrape
    path: /actuator/prometheus
    target: http://internal:9090
    public: true
"#,
    );

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.server.port, 8080);
    assert!(config.auth.enabled);
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.circuit_breaker.window, Duration::from_secs(10));
    assert_eq!(config.circuit_breaker.cooldown, Duration::from_secs(5));
    assert_eq!(config.routes.len(), 2);
    assert_eq!(config.routes[0].timeout, Duration::from_secs(3));
}

#[test]
fn missing_file_is_a_config_error() {
    let err = Config::load(Some(std::path::Path::new("/nonexistent/gateway.yaml"))).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn duplicate_route_id_fails_load() {
    let file = write_config(
        r#"
routes:
  - id: crypto
    path: /crypto/**
    target: http://a:1
  - id: crypto
    path: /other/**
    target: http://b:1
"#,
    );

    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Duplicate route id"));
}

#[test]
fn auth_enabled_without_issuer_fails_load() {
    let file = write_config(
        r#"
auth:
  enabled: true
"#,
    );

    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("issuer"));
}

#[test]
fn defaults_apply_without_file() {
    let config = Config::load(None).unwrap();
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.circuit_breaker.failure_threshold, 5);
    assert_eq!(config.fallback.status, 503);
    assert!(!config.auth.enabled);
    assert!(config.routes.is_empty());
    assert!(config
        .auth
        .public_paths
        .iter()
        .any(|p| p == "/metrics"));
}

// Configuration module unit tests

use kagami::config::*;

const FULL_CONFIG: &str = r#"
server:
  address: "127.0.0.1"
  port: 8080
  path_prefix: "/img"
security:
  secret: "k"
  unsafe: false
  strict_params: true
timeouts:
  request_ms: 5000
  save_ms: 10000
coalescing:
  enabled: true
  grace_ms: 100
  max_in_flight: 64
loaders:
  file:
    base_dir: /var/images
    path_prefix: local/
    max_allowed_size: 1048576
  s3:
    bucket: images
    region: eu-west-1
    endpoint: "http://localhost:9000"
    access_key: minio
    secret_key: minio123
    base_dir: originals
    force_path_style: true
  http:
    allowed_sources: ["*.example.com", "cdn.example.org"]
    max_allowed_size: 5242880
    user_agent: "kagami/1"
    timeout_ms: 3000
storages:
  file:
    base_dir: /var/results
processor:
  disable_blur: true
  disabled_filters: ["sharpen"]
  max_width: 4000
  max_height: 3000
  default_quality: 85
logging:
  format: pretty
  level: debug
"#;

#[test]
fn test_can_deserialize_full_config() {
    let config = Config::from_yaml_with_env(FULL_CONFIG).expect("Failed to parse config");

    assert_eq!(config.server.listen_addr(), "127.0.0.1:8080");
    assert_eq!(config.server.path_prefix, "/img");
    assert!(config.security.strict_params);
    assert_eq!(config.timeouts.request_ms, 5000);
    assert_eq!(config.coalescing.max_in_flight, Some(64));

    let file = config.loaders.file.as_ref().unwrap();
    assert_eq!(file.path_prefix, "local/");
    assert_eq!(file.max_allowed_size, 1_048_576);

    let s3 = config.loaders.s3.as_ref().unwrap();
    assert_eq!(s3.region, "eu-west-1");
    assert_eq!(s3.endpoint.as_deref(), Some("http://localhost:9000"));
    assert!(s3.force_path_style);

    let http = config.loaders.http.as_ref().unwrap();
    assert_eq!(http.allowed_sources.len(), 2);
    assert_eq!(http.user_agent.as_deref(), Some("kagami/1"));

    assert_eq!(config.processor.default_quality, 85);
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.validate().is_ok());
}

#[test]
fn test_disable_blur_adds_blur_to_disabled_set() {
    let config = Config::from_yaml_with_env(FULL_CONFIG).unwrap();
    let disabled = config.processor.disabled();
    assert!(disabled.iter().any(|name| name == "blur"));
    assert!(disabled.iter().any(|name| name == "sharpen"));
}

#[test]
fn test_defaults_for_omitted_sections() {
    let config = Config::from_yaml_with_env("security: {secret: k}").unwrap();
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.timeouts.request_ms, 30_000);
    assert_eq!(config.timeouts.save_ms, 60_000);
    assert!(config.coalescing.enabled);
    assert!(config.coalescing.max_in_flight.is_none());
    assert!(config.loaders.is_empty());
    assert!(config.storages.file.is_none());
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_unknown_log_format_is_parse_error() {
    let yaml = r#"
logging:
  format: xml
"#;
    assert!(matches!(
        Config::from_yaml_with_env(yaml),
        Err(ConfigError::Parse(_))
    ));
}

#[tokio::test]
async fn test_build_engine_registers_backends_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
security: {{secret: k}}
loaders:
  file:
    base_dir: {base}
  http: {{}}
storages:
  file:
    base_dir: {base}/results
coalescing:
  enabled: false
"#,
        base = dir.path().display()
    );
    let config = Config::from_yaml_with_env(&yaml).unwrap();
    config.validate().unwrap();

    let engine = config.build_engine().await.unwrap();
    assert_eq!(engine.loader_count(), 2);
    assert_eq!(engine.storage_count(), 1);
    assert_eq!(engine.processor_count(), 1);
    assert_eq!(engine.in_flight_count(), 0);
}

#[tokio::test]
async fn test_disabled_processor_is_not_registered() {
    let yaml = r#"
security: {secret: k}
loaders:
  file:
    base_dir: /tmp
processor:
  enabled: false
"#;
    let config = Config::from_yaml_with_env(yaml).unwrap();
    let engine = config.build_engine().await.unwrap();
    assert_eq!(engine.processor_count(), 0);
}

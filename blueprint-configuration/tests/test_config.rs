use std::io::Write;
use std::time::Duration;

use blueprint::{BlueprintCache, DownloadPolicyExt};
use blueprint_configuration::{BlueprintConfig, ConfigError, DownloadMode, DownloadsConfig};
use pretty_assertions::assert_eq;

#[test]
fn test_full_config_deserialize() {
    let yaml = r#"
cache:
  ttl: 1m
  sweep_interval: 10s
  load_timeout: 15s
  embedded_capacity: 256
downloads:
  mode: AllowList
  hosts:
    - blueprints.example.com
    - "*.cdn.example.com"
  schemes:
    - https
"#;

    let config = BlueprintConfig::from_yaml(yaml).expect("failed to deserialize");

    assert_eq!(config.cache.ttl, Duration::from_secs(60));
    assert_eq!(config.cache.sweep_interval, Duration::from_secs(10));
    assert_eq!(config.cache.load_timeout, Some(Duration::from_secs(15)));
    assert_eq!(config.cache.embedded_capacity, 256);
    assert_eq!(
        config.downloads,
        DownloadsConfig {
            mode: DownloadMode::AllowList,
            hosts: vec![
                "blueprints.example.com".to_string(),
                "*.cdn.example.com".to_string()
            ],
            schemes: vec!["https".to_string()],
        }
    );
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = BlueprintConfig::from_yaml("{}").expect("failed to deserialize");
    assert_eq!(config, BlueprintConfig::default());
    assert_eq!(config.downloads.mode, DownloadMode::Disabled);
    assert_eq!(config.downloads.schemes, vec!["http", "https"]);
}

#[test]
fn test_partial_cache_section() {
    let yaml = r#"
cache:
  ttl: 45s
downloads:
  mode: Any
"#;
    let config = BlueprintConfig::from_yaml(yaml).expect("failed to deserialize");
    assert_eq!(config.cache.ttl, Duration::from_secs(45));
    assert_eq!(config.cache.sweep_interval, Duration::from_secs(5));
    assert_eq!(config.downloads.mode, DownloadMode::Any);
}

#[test]
fn test_rules_from_yaml() {
    let yaml = r#"
downloads:
  mode: AllowList
  hosts:
    - "*.cdn.example.com"
"#;
    let (_, rules) = BlueprintConfig::from_yaml(yaml)
        .unwrap()
        .into_parts()
        .unwrap();

    assert!(rules.allowed("https://eu.cdn.example.com/house.bp"));
    assert!(!rules.allowed("https://example.org/house.bp"));
    assert!(rules.allowed("file:///srv/house.bp"));
}

#[test]
fn test_invalid_cache_settings_are_rejected() {
    let yaml = r#"
cache:
  ttl: 5s
  sweep_interval: 5s
"#;
    let err = BlueprintConfig::from_yaml(yaml)
        .unwrap()
        .into_parts()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Cache(_)));
}

#[test]
fn test_invalid_host_pattern_is_rejected() {
    let yaml = r#"
downloads:
  mode: AllowList
  hosts:
    - "bad host"
"#;
    let err = BlueprintConfig::from_yaml(yaml)
        .unwrap()
        .into_parts()
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid host pattern 'bad host': only letters, digits, '-' and '.' are allowed, with an optional leading '*.'"
    );
}

#[test]
fn test_unknown_mode_fails_to_parse() {
    let yaml = r#"
downloads:
  mode: Sometimes
"#;
    assert!(matches!(
        BlueprintConfig::from_yaml(yaml),
        Err(ConfigError::Yaml(_))
    ));
}

#[test]
fn test_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"downloads:\n  mode: Any\n").unwrap();
    let config = BlueprintConfig::from_path(file.path()).unwrap();
    assert_eq!(config.downloads.mode, DownloadMode::Any);

    assert!(matches!(
        BlueprintConfig::from_path("/nonexistent/blueprint.yaml"),
        Err(ConfigError::Io(_))
    ));
}

#[tokio::test]
async fn test_into_builder_builds_cache() {
    let yaml = r#"
cache:
  ttl: 1m
downloads:
  mode: AllowList
  hosts:
    - blueprints.example.com
"#;
    let cache: BlueprintCache = BlueprintConfig::from_yaml(yaml)
        .unwrap()
        .into_builder()
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(cache.config().ttl, Duration::from_secs(60));
    assert!(cache.resolve_url("https://other.example.com/a.bp").is_none());
    assert!(cache.resolve_url("https://blueprints.example.com/a.bp").is_some());
}

use std::time::Duration;

use graft_core::config::GraftConfig;
use tempfile::TempDir;

#[test]
fn defaults_when_missing() {
    let tmp = TempDir::new().unwrap();
    let config = GraftConfig::load_from(&tmp.path().join("config.toml")).unwrap();
    assert_eq!(config, GraftConfig::default());
    assert_eq!(config.resolver.timeout(), Duration::from_secs(30));
    assert_eq!(config.resolver.max_retries, 3);
    assert!(!config.resolver.allow_prerelease);
    assert!(config.registry.path.is_none());
}

#[test]
fn parses_resolver_and_registry_sections() {
    let config = GraftConfig::parse(
        r#"
[resolver]
timeout-secs = 5
retry-delay-ms = 10
max-concurrent-fetches = 2
allow-prerelease = true

[registry]
path = "/srv/registry"
"#,
    )
    .unwrap();
    assert_eq!(config.resolver.timeout(), Duration::from_secs(5));
    assert_eq!(config.resolver.retry_delay(), Duration::from_millis(10));
    assert_eq!(config.resolver.max_concurrent_fetches, 2);
    assert_eq!(config.resolver.max_retries, 3);
    assert!(config.resolver.allow_prerelease);
    assert_eq!(
        config.registry.path.as_deref(),
        Some(std::path::Path::new("/srv/registry"))
    );
}

#[test]
fn invalid_config_is_an_error() {
    assert!(GraftConfig::parse("[resolver]\ntimeout-secs = \"soon\"\n").is_err());
}

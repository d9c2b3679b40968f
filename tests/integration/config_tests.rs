use crosslink::config::{Config, ConfigError, ConfigOverrides};
use crosslink::scanner::ExclusionRule;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_toml_file_layer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
volumes = ["/mnt/disk1", "/mnt/disk2"]
exclusions = ["{volume}/appdata"]
io_threads = 2
skip_shared_inodes = false
"#,
    )
    .unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap();

    assert_eq!(
        config.volumes,
        vec![PathBuf::from("/mnt/disk1"), PathBuf::from("/mnt/disk2")]
    );
    assert_eq!(config.exclusions, vec![ExclusionRule::new("{volume}/appdata")]);
    assert_eq!(config.io_threads, 2);
    assert!(!config.skip_shared_inodes);
    assert_eq!(config.priority_segment, "^torrents?$");
}

#[test]
fn test_env_and_cli_layers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "io_threads = 2\nmin_size = 10\n").unwrap();

    std::env::set_var("CROSSLINK_IO_THREADS", "6");
    std::env::set_var("CROSSLINK_SKIP_HIDDEN", "true");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("CROSSLINK_").split("__"))
        .extract()
        .unwrap();
    assert_eq!(config.io_threads, 6);
    assert_eq!(config.min_size, 10);
    assert!(config.skip_hidden);

    let overrides = ConfigOverrides {
        io_threads: Some(1),
        ..Default::default()
    };
    let loaded = Config::load(Some(&path), &overrides).unwrap();
    assert_eq!(loaded.io_threads, 1);
    assert_eq!(loaded.min_size, 10);
    assert!(loaded.skip_hidden);

    std::env::remove_var("CROSSLINK_IO_THREADS");
    std::env::remove_var("CROSSLINK_SKIP_HIDDEN");
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "io_threads = [unterminated").unwrap();

    let err = Config::load(Some(&path), &ConfigOverrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = Config::load(
        Some(&dir.path().join("absent.toml")),
        &ConfigOverrides::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn test_invalid_priority_pattern_rejected_on_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "priority_segment = \"[unclosed\"").unwrap();

    let err = Config::load(Some(&path), &ConfigOverrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Pattern(_)));
}

#[test]
fn test_resolve_volumes_from_config() {
    let v1 = tempdir().unwrap();
    let v2 = tempdir().unwrap();
    let config = Config {
        volumes: vec![v1.path().to_path_buf(), v2.path().to_path_buf()],
        ..Default::default()
    };
    let volumes = config.resolve_volumes().unwrap();
    assert_eq!(volumes.len(), 2);

    let empty = Config::default();
    assert!(matches!(
        empty.resolve_volumes(),
        Err(ConfigError::Volumes(_))
    ));
}

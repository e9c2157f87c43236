// Tests for config file handling

use gedung_core::Config;
use gedung_fetch::normalize::{DOWNLOAD_PREFIX, STORAGE_PREFIX};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_missing_file_gives_defaults() {
    let temp = TempDir::new().unwrap();
    let config = Config::load(&temp.path().join("nope.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_then_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.confidence = 0.4;
    config.concurrency = 8;
    config.output_dir = "/tmp/gedung-out".to_string();
    config.save(&path).unwrap();

    assert!(path.is_file());
    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.output_dir(), PathBuf::from("/tmp/gedung-out"));
}

#[test]
fn test_partial_file_fills_in_defaults() {
    let config = Config::from_toml_str("timeout_secs = 30\nconcurrency = 2\n").unwrap();

    assert_eq!(config.timeout(), Duration::from_secs(30));
    assert_eq!(config.concurrency, 2);
    assert_eq!(config.confidence, 0.25);
    assert_eq!(config.input_size, 640);
    assert_eq!(config.download_prefix, DOWNLOAD_PREFIX);
    assert_eq!(config.users.len(), 4);
}

#[test]
fn test_users_table_replaces_builtin_accounts() {
    let config = Config::from_toml_str(
        r#"
[users]
surveyor = "lapangan"
"#,
    )
    .unwrap();

    let store = config.credential_store();
    assert_eq!(store.len(), 1);
    assert!(store.verify("surveyor", "lapangan"));
    assert!(!store.verify("admin", "rahasia123"));
}

#[test]
fn test_invalid_toml_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "confidence = \"high\"").unwrap();

    assert!(Config::load(&path).is_err());
}

#[test]
fn test_normalizer_uses_configured_prefixes() {
    let config = Config::from_toml_str(
        r#"
download_prefix = "http://localhost:9000/get?file="
storage_prefix = "https://bucket.test/"
"#,
    )
    .unwrap();

    let normalizer = config.normalizer();
    assert_eq!(
        normalizer.normalize("https://bucket.test/a/b.jpg"),
        "http://localhost:9000/get?file=a/b.jpg"
    );
}

#[test]
fn test_default_normalizer_matches_production_endpoints() {
    let normalizer = Config::default().normalizer();
    assert_eq!(normalizer.download_prefix(), DOWNLOAD_PREFIX);
    assert_eq!(normalizer.storage_prefix(), STORAGE_PREFIX);
}

#[test]
fn test_serialized_config_mentions_every_field() {
    let text = Config::default().to_toml_string().unwrap();
    for key in [
        "model_path",
        "output_dir",
        "confidence",
        "iou_threshold",
        "input_size",
        "timeout_secs",
        "concurrency",
        "download_prefix",
        "storage_prefix",
        "[users]",
    ] {
        assert!(text.contains(key), "missing {}", key);
    }
}

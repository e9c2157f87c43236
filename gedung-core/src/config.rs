// Configuration file handling (~/.config/gedung/config.toml)

use crate::auth::{CredentialStore, builtin_users};
use crate::error::ConfigError;
use gedung_fetch::UrlNormalizer;
use gedung_fetch::normalize::{DOWNLOAD_PREFIX, STORAGE_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/gedung/";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// YOLO weights exported to ONNX.
    pub model_path: String,
    /// Scratch directory wiped at the start of every run.
    pub output_dir: String,
    pub confidence: f32,
    pub iou_threshold: f32,
    /// Square input edge the model was exported with.
    pub input_size: u32,
    pub timeout_secs: u64,
    /// Downloads kept in flight at once. Results stay in input order.
    pub concurrency: usize,
    pub download_prefix: String,
    pub storage_prefix: String,
    pub users: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: format!("{}models/best.onnx", DEFAULT_CONFIG_DIR),
            output_dir: "temp_process".to_string(),
            confidence: 0.25,
            iou_threshold: 0.7,
            input_size: 640,
            timeout_secs: gedung_fetch::DEFAULT_TIMEOUT_SECS,
            concurrency: 1,
            download_prefix: DOWNLOAD_PREFIX.to_string(),
            storage_prefix: STORAGE_PREFIX.to_string(),
            users: builtin_users(),
        }
    }
}

impl Config {
    pub fn default_dir() -> PathBuf {
        expand_path(DEFAULT_CONFIG_DIR)
    }

    pub fn default_path() -> PathBuf {
        Self::default_dir().join(CONFIG_FILE_NAME)
    }

    /// A missing file is not an error: the defaults are used.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn model_path(&self) -> PathBuf {
        expand_path(&self.model_path)
    }

    pub fn output_dir(&self) -> PathBuf {
        expand_path(&self.output_dir)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(self.users.clone())
    }

    pub fn normalizer(&self) -> UrlNormalizer {
        UrlNormalizer::new(&self.download_prefix, &self.storage_prefix)
    }
}

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

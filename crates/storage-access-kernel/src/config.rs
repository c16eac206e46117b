//! Configuration for storage-access.
//!
//! Configuration is loaded from `~/.config/storage-access/storage-access.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::external::DEFAULT_JPEG_QUALITY;
use crate::paths;
use crate::provider::EXTERNAL_STORAGE_AUTHORITY;

const CONFIG_FILE: &str = "storage-access.toml";

/// Configuration for a storage dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// App-private directory served by the internal backend.
    #[serde(default = "paths::default_sandbox_root")]
    pub sandbox_root: PathBuf,

    /// Authority of the document provider.
    #[serde(default = "default_authority")]
    pub authority: String,

    /// Host directory exposed as the external document tree.
    ///
    /// Without one, the external provider starts empty.
    #[serde(default)]
    pub external_root: Option<PathBuf>,

    /// Volume name of the external tree (`primary` → `primary:` IDs).
    #[serde(default = "default_root_id")]
    pub external_root_id: String,

    /// Worker threads of the owned pool; unset means one per core.
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// JPEG quality for image conversion (1–100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Where the granted root is persisted.
    #[serde(default = "paths::preferences_path")]
    pub preferences_path: PathBuf,
}

fn default_authority() -> String {
    EXTERNAL_STORAGE_AUTHORITY.to_string()
}

fn default_root_id() -> String {
    "primary".to_string()
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sandbox_root: paths::default_sandbox_root(),
            authority: default_authority(),
            external_root: None,
            external_root_id: default_root_id(),
            worker_threads: None,
            jpeg_quality: default_jpeg_quality(),
            preferences_path: paths::preferences_path(),
        }
    }
}

impl StorageConfig {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_path() -> PathBuf {
        paths::config_dir().join(CONFIG_FILE)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (1..=100).contains(&self.jpeg_quality),
            "jpeg_quality must be between 1 and 100, got {}",
            self.jpeg_quality
        );
        anyhow::ensure!(!self.authority.is_empty(), "authority must not be empty");
        anyhow::ensure!(
            !self.external_root_id.is_empty() && !self.external_root_id.contains([':', '/']),
            "external_root_id must be a bare volume name, got {:?}",
            self.external_root_id
        );
        anyhow::ensure!(
            self.sandbox_root.is_absolute(),
            "sandbox_root must be absolute, got {}",
            self.sandbox_root.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.authority, EXTERNAL_STORAGE_AUTHORITY);
        assert_eq!(config.external_root_id, "primary");
        assert_eq!(config.jpeg_quality, 100);
        assert!(config.external_root.is_none());
        assert!(config.worker_threads.is_none());
        assert!(config.sandbox_root.ends_with("files"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
sandbox_root = "/srv/app/files"
authority = "com.example.documents"
external_root = "/mnt/phone"
external_root_id = "sdcard"
worker_threads = 2
jpeg_quality = 85
preferences_path = "/srv/app/prefs.json"
"#;

        let config: StorageConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(config.sandbox_root, PathBuf::from("/srv/app/files"));
        assert_eq!(config.authority, "com.example.documents");
        assert_eq!(config.external_root, Some(PathBuf::from("/mnt/phone")));
        assert_eq!(config.external_root_id, "sdcard");
        assert_eq!(config.worker_threads, Some(2));
        assert_eq!(config.jpeg_quality, 85);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: StorageConfig = toml::from_str("").expect("parse failed");
        assert_eq!(config, StorageConfig::default());
    }

    #[test]
    fn test_config_path_is_under_config_dir() {
        let path = StorageConfig::config_path();
        assert_eq!(path, paths::config_dir().join("storage-access.toml"));
        assert!(path.starts_with(paths::xdg_config_home()));
    }

    #[test]
    fn test_load_from_rejects_bad_quality() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage-access.toml");
        std::fs::write(&path, "jpeg_quality = 0\n").unwrap();
        let err = StorageConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("jpeg_quality"));
    }

    #[test]
    fn test_load_from_missing_file_has_context() {
        let err = StorageConfig::load_from(Path::new("/nonexistent/storage-access.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}

//! Configuration management for Lapis index storage
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (LAPIS_* prefix)
//! 2. lapis.local.toml (gitignored, local overrides)
//! 3. lapis.toml (git-tracked, project config)
//! 4. ~/.config/lapis/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Lapis configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LapisConfig {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub locking: LockingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Index directory. Relative paths resolve against the project directory.
    pub path: PathBuf,
    pub backend: StorageBackend,
    /// Largest single OS read in bytes; unset means the platform default.
    pub read_chunk_size: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".lapis/index"),
            backend: StorageBackend::Auto,
            read_chunk_size: None,
        }
    }
}

/// How files of the index directory are read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    /// Pick per platform.
    Auto,
    Mmap,
    Positional,
    Simple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Wrap the index directory in a near-real-time RAM cache.
    pub enabled: bool,
    pub max_merge_size_mb: f64,
    pub max_cached_mb: f64,
    /// Commit generation file; always written straight to disk.
    pub generation_file: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_merge_size_mb: 5.0,
            max_cached_mb: 60.0,
            generation_file: "segments.gen".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    pub kind: LockKind,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LockKind {
    /// OS advisory locks on lock files in the index directory.
    #[default]
    Native,
    /// Locks visible only inside this process.
    SingleInstance,
    /// No locking at all.
    None,
}

impl LapisConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse and validate a single TOML file, without merging any other source.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for tests and throwaway indexes: no cache, in-process locks.
    pub fn ephemeral(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                path: path.into(),
                ..Default::default()
            },
            cache: CacheConfig {
                enabled: false,
                ..Default::default()
            },
            locking: LockingConfig {
                kind: LockKind::SingleInstance,
            },
        }
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if self.storage.path.is_relative() {
            self.storage.path = base.join(&self.storage.path);
        }
    }

    /// Rejects values the storage layer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.read_chunk_size == Some(0) {
            return Err(ConfigError::ValidationError(
                "storage.read_chunk_size must be positive".to_string(),
            ));
        }

        for (key, value) in [
            ("cache.max_merge_size_mb", self.cache.max_merge_size_mb),
            ("cache.max_cached_mb", self.cache.max_cached_mb),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{key} must be a positive number, got {value}"
                )));
            }
        }

        if self.cache.generation_file.is_empty() {
            return Err(ConfigError::ValidationError(
                "cache.generation_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config() {
        let config = LapisConfig::default();
        assert_eq!(config.storage.path, PathBuf::from(".lapis/index"));
        assert_eq!(config.storage.backend, StorageBackend::Auto);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.generation_file, "segments.gen");
        assert_eq!(config.locking.kind, LockKind::Native);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ephemeral_config() {
        let config = LapisConfig::ephemeral("/tmp/scratch");
        assert!(!config.cache.enabled);
        assert_eq!(config.locking.kind, LockKind::SingleInstance);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/scratch"));
    }

    #[test]
    fn test_path_resolution() {
        let mut config = LapisConfig::default();
        config.resolve_paths("/home/user/project");
        assert_eq!(
            config.storage.path,
            PathBuf::from("/home/user/project/.lapis/index")
        );

        config.storage.path = PathBuf::from("/var/lib/lapis");
        config.resolve_paths("/home/user/project");
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/lapis"));
    }

    #[test_case(0.0, 60.0; "zero merge size")]
    #[test_case(-1.0, 60.0; "negative merge size")]
    #[test_case(5.0, f64::NAN; "nan cache size")]
    fn test_rejects_bad_cache_sizes(merge: f64, cached: f64) {
        let mut config = LapisConfig::default();
        config.cache.max_merge_size_mb = merge;
        config.cache.max_cached_mb = cached;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_merge_cap_above_total_is_allowed() {
        let mut config = LapisConfig::default();
        config.cache.max_merge_size_mb = 100.0;
        config.cache.max_cached_mb = 10.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_chunk_and_empty_generation_file() {
        let mut config = LapisConfig::default();
        config.storage.read_chunk_size = Some(0);
        assert!(config.validate().is_err());

        let mut config = LapisConfig::default();
        config.cache.generation_file.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("lapis.toml");
        std::fs::write(
            &path,
            r#"
[storage]
backend = "positional"
read_chunk_size = 65536

[locking]
kind = "single-instance"
"#,
        )
        .expect("Failed to write config");

        let config = LapisConfig::from_file(&path).expect("Failed to parse config");
        assert_eq!(config.storage.backend, StorageBackend::Positional);
        assert_eq!(config.storage.read_chunk_size, Some(65536));
        assert_eq!(config.locking.kind, LockKind::SingleInstance);
        assert_eq!(config.cache, CacheConfig::default());

        std::fs::write(&path, "[storage\nbackend = ").expect("Failed to write config");
        assert!(matches!(
            LapisConfig::from_file(&path),
            Err(ConfigError::ParseError { .. })
        ));
        assert!(matches!(
            LapisConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }

    #[test_case("[cache]\nmax_cached_mb = 0.0\n"; "zero cache")]
    #[test_case("[cache]\nmax_merge_size_mb = -1.0\n"; "negative merge cap")]
    #[test_case("[storage]\nread_chunk_size = 0\n"; "zero read chunk")]
    fn test_from_file_rejects_invalid_values(content: &str) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("lapis.toml");
        std::fs::write(&path, content).expect("Failed to write config");

        assert!(matches!(
            LapisConfig::from_file(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }
}

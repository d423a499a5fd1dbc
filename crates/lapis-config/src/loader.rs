//! Configuration loader with multi-source merging

use crate::{LapisConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "LAPIS".to_string(),
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "LAPIS")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<LapisConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = LapisConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2-4. User config, then lapis.toml, then lapis.local.toml. Missing
        // files are skipped by the builder.
        let files = Paths::new()
            .user_config_file()
            .ok()
            .into_iter()
            .chain([
                Paths::project_config_file(&self.project_dir),
                Paths::local_config_file(&self.project_dir),
            ]);
        for file in files {
            builder = builder.add_source(
                config::File::from(file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables, e.g. LAPIS_STORAGE__READ_CHUNK_SIZE.
        // Keys contain underscores, so sections are split on a double one.
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config = builder
            .build()
            .and_then(config::Config::try_deserialize::<LapisConfig>)
            .context("Failed to merge configuration sources")?;
        config.resolve_paths(&self.project_dir);
        config.validate().context("Configuration failed validation")?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> LapisConfig {
        let project_dir = self.project_dir.clone();
        self.load().unwrap_or_else(|_| {
            let mut config = LapisConfig::default();
            config.resolve_paths(project_dir);
            config
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LockKind, StorageBackend};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_env_prefix("LAPIS_TEST_DEFAULTS")
            .load()
            .expect("Failed to load config");

        assert_eq!(config.storage.backend, StorageBackend::Auto);
        assert!(config.cache.enabled);
        assert!((config.cache.max_cached_mb - 60.0).abs() < f64::EPSILON);
        assert_eq!(config.storage.read_chunk_size, None);
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[storage]
path = "data/idx"
backend = "simple"

[cache]
max_merge_size_mb = 2.5
generation_file = "generation"

[locking]
kind = "none"
"#;
        fs::write(project_dir.join("lapis.toml"), config_content)
            .expect("Failed to write config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("LAPIS_TEST_PROJECT")
            .load()
            .expect("Failed to load config");

        assert_eq!(config.storage.path, project_dir.join("data/idx"));
        assert_eq!(config.storage.backend, StorageBackend::Simple);
        assert!((config.cache.max_merge_size_mb - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.cache.generation_file, "generation");
        assert_eq!(config.locking.kind, LockKind::None);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("lapis.toml"),
            r#"
[storage]
backend = "mmap"
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("lapis.local.toml"),
            r#"
[storage]
backend = "positional"
"#,
        )
        .expect("Failed to write local config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("LAPIS_TEST_LOCAL")
            .load()
            .expect("Failed to load config");

        // Local config should override project config
        assert_eq!(config.storage.backend, StorageBackend::Positional);
    }

    #[test]
    fn test_invalid_values_fail_to_load() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(
            project_dir.join("lapis.toml"),
            "[cache]\nmax_cached_mb = -4.0\n",
        )
        .expect("Failed to write config");

        let loader = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("LAPIS_TEST_INVALID");
        assert!(loader.load().is_err());

        let fallback = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("LAPIS_TEST_INVALID")
            .load_or_default();
        assert!(fallback.storage.path.is_absolute());
        assert!((fallback.cache.max_cached_mb - 60.0).abs() < f64::EPSILON);
    }

    // Environment overrides are not exercised here: the process environment is
    // shared between tests. In actual usage:
    //
    // LAPIS_STORAGE__BACKEND=positional
    // LAPIS_CACHE__MAX_CACHED_MB=128
    // LAPIS_LOCKING__KIND=single-instance
}

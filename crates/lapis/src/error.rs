//! Error types for the Lapis facade.

use lapis_config::ConfigError;
use lapis_io::DirectoryError;

/// Errors raised while opening or using a Lapis directory stack.
#[derive(Debug, thiserror::Error)]
pub enum LapisError {
    /// A storage operation failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration sources could not be read or merged.
    #[error("failed to load configuration: {0:#}")]
    Load(#[from] anyhow::Error),
}

/// Result alias for the facade.
pub type Result<T> = std::result::Result<T, LapisError>;

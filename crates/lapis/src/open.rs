//! Building a configured directory stack.

use std::path::Path;
use std::sync::Arc;

use lapis_config::{ConfigLoader, LapisConfig, LockKind, StorageBackend};
use lapis_io::{Directory, FsDirectory, FsKind, NoLockFactory, SingleInstanceLockFactory};
use lapis_nrt::{NrtCachingConfig, NrtCachingDirectory};

use crate::error::Result;

/// Opens the index directory described by `config`.
///
/// Builds a filesystem directory with the configured backend and lock
/// factory, wrapped in a near-real-time cache when `cache.enabled` is set.
/// The index folder itself is created by the first write.
pub fn open(config: &LapisConfig) -> Result<Arc<dyn Directory>> {
    config.validate()?;

    let kind = match config.storage.backend {
        StorageBackend::Auto => FsKind::for_platform(),
        StorageBackend::Mmap => FsKind::Mmap,
        StorageBackend::Positional => FsKind::Positional,
        StorageBackend::Simple => FsKind::Simple,
    };

    let mut dir = FsDirectory::with_kind(&config.storage.path, kind)?;
    if let Some(read_chunk_size) = config.storage.read_chunk_size {
        dir = dir.with_read_chunk_size(read_chunk_size);
    }
    dir = match config.locking.kind {
        LockKind::Native => dir,
        LockKind::SingleInstance => dir.with_lock_factory(SingleInstanceLockFactory::new()),
        LockKind::None => dir.with_lock_factory(NoLockFactory),
    };

    tracing::info!(
        path = %config.storage.path.display(),
        backend = %kind,
        locking = ?config.locking.kind,
        cache = config.cache.enabled,
        "opening index directory"
    );

    if !config.cache.enabled {
        return Ok(Arc::new(dir));
    }
    let cache = NrtCachingConfig::from_megabytes(
        config.cache.max_merge_size_mb,
        config.cache.max_cached_mb,
    )
    .with_generation_file(config.cache.generation_file.clone());
    Ok(Arc::new(NrtCachingDirectory::new(dir, cache)))
}

/// Loads the layered configuration of `project_dir` and opens its index.
pub fn open_project(project_dir: impl AsRef<Path>) -> Result<Arc<dyn Directory>> {
    let config = ConfigLoader::new().with_project_dir(project_dir).load()?;
    open(&config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IoContext, LapisError};
    use test_case::test_case;

    fn roundtrip(dir: &dyn Directory) {
        let mut out = dir.create_output("_0.cfs", &IoContext::flush(64)).unwrap();
        out.write_bytes(b"lapis").unwrap();
        out.close().unwrap();
        dir.sync(&["_0.cfs"]).unwrap();

        let mut input = dir.open_input("_0.cfs", &IoContext::Default).unwrap();
        let mut buf = [0u8; 5];
        input.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf, b"lapis");
        input.close().unwrap();
    }

    #[test_case(StorageBackend::Auto; "auto")]
    #[test_case(StorageBackend::Mmap; "mmap")]
    #[test_case(StorageBackend::Positional; "positional")]
    #[test_case(StorageBackend::Simple; "simple")]
    fn open_each_backend(backend: StorageBackend) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = LapisConfig::ephemeral(tmp.path().join("index"));
        config.storage.backend = backend;

        let dir = open(&config).unwrap();
        roundtrip(dir.as_ref());
        assert!(tmp.path().join("index").join("_0.cfs").exists());
        dir.close().unwrap();
    }

    #[test]
    fn cached_stack_persists_on_sync() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = LapisConfig::default();
        config.resolve_paths(tmp.path());

        let dir = open(&config).unwrap();
        assert!(format!("{dir:?}").starts_with("NrtCachingDirectory"));
        roundtrip(dir.as_ref());
        assert!(config.storage.path.join("_0.cfs").exists());
        dir.close().unwrap();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = LapisConfig::ephemeral(tmp.path());
        config.cache.max_cached_mb = 0.0;
        assert!(matches!(open(&config), Err(LapisError::Config(_))));
    }

    #[test]
    fn open_project_reads_project_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("lapis.toml"),
            "[storage]\npath = \"idx\"\n\n[cache]\nenabled = false\n",
        )
        .unwrap();

        let dir = open_project(tmp.path()).unwrap();
        assert!(format!("{dir:?}").starts_with("FsDirectory"));
        roundtrip(dir.as_ref());
        assert!(tmp.path().join("idx").join("_0.cfs").exists());
    }
}

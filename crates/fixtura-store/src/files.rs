use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};

/// Read-only access to fixture content files.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;
    async fn read_text(&self, path: &Path) -> StoreResult<String>;
    async fn read_bytes(&self, path: &Path) -> StoreResult<Vec<u8>>;

    /// Every file below `dir`, recursively, sorted by path. Empty when
    /// `dir` is not a directory.
    async fn list_files(&self, dir: &Path) -> StoreResult<Vec<PathBuf>>;

    /// Immediate children of `dir` as `(path, is_dir)`. Empty when `dir`
    /// is not a directory.
    async fn list_dir(&self, dir: &Path) -> StoreResult<Vec<(PathBuf, bool)>>;
}

/// `FileSource` backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFiles;

#[async_trait]
impl FileSource for LocalFiles {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    async fn read_text(&self, path: &Path) -> StoreResult<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| io_error(path, source))
    }

    async fn read_bytes(&self, path: &Path) -> StoreResult<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|source| io_error(path, source))
    }

    async fn list_files(&self, dir: &Path) -> StoreResult<Vec<PathBuf>> {
        if !is_dir(dir).await {
            return Ok(Vec::new());
        }
        let root = dir.to_path_buf();
        tokio::task::spawn_blocking(move || walk_files(&root))
            .await
            .map_err(|err| io_error(dir, std::io::Error::other(err)))?
    }

    async fn list_dir(&self, dir: &Path) -> StoreResult<Vec<(PathBuf, bool)>> {
        if !is_dir(dir).await {
            return Ok(Vec::new());
        }
        let mut reader = tokio::fs::read_dir(dir)
            .await
            .map_err(|source| io_error(dir, source))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|source| io_error(dir, source))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|source| io_error(&entry.path(), source))?;
            entries.push((entry.path(), file_type.is_dir()));
        }
        entries.sort();
        Ok(entries)
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

fn walk_files(root: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            io_error(&path, std::io::Error::other(err))
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

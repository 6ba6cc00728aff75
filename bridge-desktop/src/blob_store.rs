//! Blob Storage Implementation using Tokio fs

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::BlobStore,
};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const BLOB_EXTENSION: &str = "blob";
const TEMP_EXTENSION: &str = "partial";

/// One file per blob under a root directory
///
/// File names are the hex encoding of the key, so keys containing `:` or
/// `/` stay valid on every platform. Writes go to a `.partial` file that is
/// renamed into place once flushed; a crash mid-write never leaves a
/// truncated blob visible under the final name.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// The directory is created lazily on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location under the platform cache directory
    pub fn in_default_cache_dir() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("offline-core")
            .join("media");
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", hex::encode(key.as_bytes()), BLOB_EXTENSION))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", hex::encode(key.as_bytes()), TEMP_EXTENSION))
    }

    fn key_from_path(path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != BLOB_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let raw = hex::decode(stem).ok()?;
        String::from_utf8(raw).ok()
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    async fn write_atomically(&self, key: &str, data: &Bytes) -> Result<()> {
        let temp = self.temp_path(key);
        let mut file = fs::File::create(&temp)
            .await
            .map_err(Self::map_io_error)?;
        file.write_all(data).await.map_err(Self::map_io_error)?;
        file.sync_all().await.map_err(Self::map_io_error)?;
        drop(file);

        fs::rename(&temp, self.blob_path(key))
            .await
            .map_err(Self::map_io_error)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(Self::map_io_error)?;

        if let Err(e) = self.write_atomically(key, &data).await {
            let _ = fs::remove_file(self.temp_path(key)).await;
            return Err(e);
        }

        debug!(key, size = data.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        match fs::read(self.blob_path(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::map_io_error(e)),
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => {
                debug!(key, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::map_io_error(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        fs::try_exists(self.blob_path(key))
            .await
            .map_err(Self::map_io_error)
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        match fs::metadata(self.blob_path(key)).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::map_io_error(e)),
        }
    }

    async fn locate(&self, key: &str) -> Result<Option<String>> {
        let path = self.blob_path(key);
        if !self.exists(key).await? {
            return Ok(None);
        }
        let absolute = match fs::canonicalize(&path).await {
            Ok(p) => p,
            Err(_) => path,
        };
        let display = absolute.to_string_lossy().replace('\\', "/");
        if display.starts_with('/') {
            Ok(Some(format!("file://{}", display)))
        } else {
            Ok(Some(format!("file:///{}", display)))
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::map_io_error(e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(Self::map_io_error)? {
            if let Some(key) = Self::key_from_path(&entry.path()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

//! Filesystem-backed ciphertext store
//!
//! Blobs live at `<root>/<resource-id>.bin`. Writes are staged to a
//! `<resource-id>.part` file and renamed into place on `finish`, so readers
//! only ever observe complete blobs.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};

use core_registry::ResourceId;

use crate::error::{Result, StoreError};
use crate::traits::{ByteStream, CiphertextStore, CiphertextWriter};

/// Filesystem implementation of [`CiphertextStore`].
pub struct FsCiphertextStore {
    root: PathBuf,
}

impl FsCiphertextStore {
    /// Create a store rooted at `root`. Call [`init`](Self::init) before use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the storage directory if it does not exist.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        debug!(root = %self.root.display(), "ciphertext store initialized");
        Ok(())
    }

    fn blob_path(&self, id: ResourceId) -> PathBuf {
        self.root.join(format!("{}.bin", id))
    }

    fn staging_path(&self, id: ResourceId) -> PathBuf {
        self.root.join(format!("{}.part", id))
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

struct FsCiphertextWriter {
    file: File,
    staging: PathBuf,
    dest: PathBuf,
    written: u64,
}

#[async_trait]
impl CiphertextWriter for FsCiphertextWriter {
    async fn append(&mut self, chunk: Bytes) -> Result<()> {
        self.file.write_all(&chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<u64> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);

        fs::rename(&self.staging, &self.dest).await?;
        Ok(self.written)
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        drop(self.file);
        remove_if_present(&self.staging).await
    }
}

#[async_trait]
impl CiphertextStore for FsCiphertextStore {
    #[instrument(skip(self), fields(resource_id = %id))]
    async fn open_writer(&self, id: ResourceId) -> Result<Box<dyn CiphertextWriter>> {
        let staging = self.staging_path(id);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)
            .await?;

        Ok(Box::new(FsCiphertextWriter {
            file,
            staging,
            dest: self.blob_path(id),
            written: 0,
        }))
    }

    async fn read(&self, id: ResourceId) -> Result<ByteStream> {
        let file = match File::open(self.blob_path(id)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::Missing(id)),
            Err(e) => return Err(e.into()),
        };

        Ok(Box::pin(ReaderStream::new(file)))
    }

    #[instrument(skip(self), fields(resource_id = %id))]
    async fn delete(&self, id: ResourceId) -> Result<()> {
        remove_if_present(&self.blob_path(id)).await?;
        if let Err(e) = remove_if_present(&self.staging_path(id)).await {
            warn!(error = %e, "failed to remove staged partial write");
        }
        Ok(())
    }

    async fn exists(&self, id: ResourceId) -> Result<bool> {
        match fs::metadata(self.blob_path(id)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, id: ResourceId) -> Result<Option<u64>> {
        match fs::metadata(self.blob_path(id)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.expect("stream error"));
        }
        out
    }

    async fn temp_store() -> (tempfile::TempDir, FsCiphertextStore) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = FsCiphertextStore::new(dir.path().join("blobs"));
        store.init().await.expect("failed to init store");
        (dir, store)
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let (_dir, store) = temp_store().await;
        let id = ResourceId::new();

        let mut writer = store.open_writer(id).await.unwrap();
        writer.append(Bytes::from_static(b"hello ")).await.unwrap();
        writer.append(Bytes::from_static(b"world")).await.unwrap();
        let written = writer.finish().await.unwrap();
        assert_eq!(written, 11);

        assert!(store.exists(id).await.unwrap());
        assert_eq!(store.size(id).await.unwrap(), Some(11));
        assert_eq!(collect(store.read(id).await.unwrap()).await, b"hello world");
    }

    #[tokio::test]
    async fn unfinished_write_is_not_addressable() {
        let (_dir, store) = temp_store().await;
        let id = ResourceId::new();

        let mut writer = store.open_writer(id).await.unwrap();
        writer.append(Bytes::from_static(b"partial")).await.unwrap();

        // Not finished: readers must not see it.
        assert!(!store.exists(id).await.unwrap());
        assert!(matches!(store.read(id).await, Err(StoreError::Missing(_))));

        writer.abort().await.unwrap();
        assert!(!store.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn abort_removes_partial_output() {
        let (_dir, store) = temp_store().await;
        let id = ResourceId::new();

        let mut writer = store.open_writer(id).await.unwrap();
        writer.append(Bytes::from_static(b"junk")).await.unwrap();
        writer.abort().await.unwrap();

        // delete() also cleans staged files, so both paths are safe to call.
        store.delete(id).await.unwrap();
        assert!(!store.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = temp_store().await;
        let id = ResourceId::new();

        let mut writer = store.open_writer(id).await.unwrap();
        writer.append(Bytes::from_static(b"data")).await.unwrap();
        writer.finish().await.unwrap();

        store.delete(id).await.unwrap();
        assert!(!store.exists(id).await.unwrap());
        assert_eq!(store.size(id).await.unwrap(), None);

        store.delete(id).await.unwrap();
    }

    #[tokio::test]
    async fn read_missing_blob_fails() {
        let (_dir, store) = temp_store().await;
        assert!(matches!(
            store.read(ResourceId::new()).await,
            Err(StoreError::Missing(_))
        ));
    }
}
